//! Record and signal types shared by the store backends, the popularity
//! engine and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hex string form of a catalog document id
pub type ProductId = String;

/// A catalog product as read from the record store
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image: Option<String>,
    pub category: String,
    pub stock_qty: i64,
    /// Precomputed average kept on the product record, if any
    pub average_rating: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(OrderStatus::Pending),
            "Confirmed" => Ok(OrderStatus::Confirmed),
            "Shipped" => Ok(OrderStatus::Shipped),
            "Delivered" => Ok(OrderStatus::Delivered),
            "Cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("Unknown order status: {}", other)),
        }
    }
}

/// Statuses whose orders never count towards popularity
pub const EXCLUDED_STATUSES: &[OrderStatus] = &[OrderStatus::Cancelled];

/// One ordered item of an order, flattened for aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLineItem {
    pub product_id: ProductId,
    pub quantity: u64,
    pub status: OrderStatus,
}

/// A comment reduced to the fields the aggregator reads
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    pub product_id: ProductId,
    pub rating: Option<f64>,
}

/// Derived popularity signals for one product, never persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSignal {
    pub product_id: ProductId,
    pub product_name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image: Option<String>,
    pub category: String,
    pub stock_qty: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub orders_count: u64,
    pub comments_count: u64,
    pub average_rating: f64,
    pub popularity_score: f64,
}

/// Write-side request to place an order
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub items: Vec<NewOrderItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub cake_id: ProductId,
    pub quantity: u64,
}

/// Write-side request to add a comment, optionally rated
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub cake_id: ProductId,
    pub text: String,
    pub rating: Option<f64>,
}

/// Partial update of a comment
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPatch {
    pub text: Option<String>,
    pub rating: Option<f64>,
}

/// Validate a rating value on the write side
pub fn validate_rating(rating: Option<f64>) -> Result<(), String> {
    match rating {
        Some(r) if !(0.0..=5.0).contains(&r) => {
            Err("Rating must be between 0 and 5".to_string())
        }
        _ => Ok(()),
    }
}

//! In-memory record store used by the test suites.

use crate::error::CakeRankError;
use crate::model::{
    CommentPatch, CommentRecord, NewComment, NewOrder, OrderLineItem, OrderStatus, Product,
};
use crate::services::store::{PerProductSource, RecordWriter, SignalSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredOrder {
    id: String,
    status: OrderStatus,
    items: Vec<(String, u64)>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: String,
    product_id: String,
    rating: Option<f64>,
}

#[derive(Default)]
struct Records {
    products: Vec<Product>,
    orders: Vec<StoredOrder>,
    comments: Vec<StoredComment>,
    next_id: u64,
}

impl Records {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}{:04}", prefix, self.next_id)
    }
}

/// Fixture store with per-contract call counters, an optional artificial
/// latency and a failure switch for the read side.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
    latency: Mutex<Option<Duration>>,
    failing: AtomicBool,
    product_listings: AtomicUsize,
    read_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn product(id: &str, name: &str, average_rating: Option<f64>) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            price: 2500.0,
            image: None,
            category: "Cakes".to_string(),
            stock_qty: 10,
            average_rating,
            created_at: None,
        }
    }

    pub fn add_product(&self, product: Product) {
        self.records.lock().products.push(product);
    }

    pub fn add_order(&self, status: OrderStatus, items: &[(&str, u64)]) -> String {
        let mut records = self.records.lock();
        let id = records.next_id("order-");
        records.orders.push(StoredOrder {
            id: id.clone(),
            status,
            items: items.iter().map(|(p, q)| (p.to_string(), *q)).collect(),
        });
        id
    }

    pub fn add_rating(&self, product_id: &str, rating: Option<f64>) -> String {
        let mut records = self.records.lock();
        let id = records.next_id("comment-");
        records.comments.push(StoredComment {
            id: id.clone(),
            product_id: product_id.to_string(),
            rating,
        });
        id
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of full catalog listings, one per aggregation run
    pub fn product_listings(&self) -> usize {
        self.product_listings.load(Ordering::SeqCst)
    }

    /// Number of read-side calls of any kind
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    async fn enter_read(&self) -> Result<(), CakeRankError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CakeRankError::StoreRead("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SignalSource for MemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>, CakeRankError> {
        self.product_listings.fetch_add(1, Ordering::SeqCst);
        self.enter_read().await?;
        Ok(self.records.lock().products.clone())
    }

    async fn list_order_line_items(
        &self,
        excluded: &[OrderStatus],
    ) -> Result<Vec<OrderLineItem>, CakeRankError> {
        self.enter_read().await?;
        let records = self.records.lock();
        Ok(records
            .orders
            .iter()
            .filter(|o| !excluded.contains(&o.status))
            .flat_map(|o| {
                o.items.iter().map(move |(product_id, quantity)| OrderLineItem {
                    product_id: product_id.clone(),
                    quantity: *quantity,
                    status: o.status,
                })
            })
            .collect())
    }

    async fn list_comments(&self) -> Result<Vec<CommentRecord>, CakeRankError> {
        self.enter_read().await?;
        let records = self.records.lock();
        Ok(records
            .comments
            .iter()
            .map(|c| CommentRecord {
                product_id: c.product_id.clone(),
                rating: c.rating,
            })
            .collect())
    }
}

#[async_trait]
impl PerProductSource for MemoryStore {
    async fn sum_ordered_quantity(
        &self,
        product_id: &str,
        excluded: &[OrderStatus],
    ) -> Result<u64, CakeRankError> {
        self.enter_read().await?;
        let records = self.records.lock();
        Ok(records
            .orders
            .iter()
            .filter(|o| !excluded.contains(&o.status))
            .flat_map(|o| o.items.iter())
            .filter(|(p, _)| p == product_id)
            .map(|(_, q)| *q)
            .sum())
    }

    async fn count_comments(&self, product_id: &str) -> Result<u64, CakeRankError> {
        self.enter_read().await?;
        let records = self.records.lock();
        Ok(records
            .comments
            .iter()
            .filter(|c| c.product_id == product_id)
            .count() as u64)
    }

    async fn list_rated_comments(&self, product_id: &str) -> Result<Vec<f64>, CakeRankError> {
        self.enter_read().await?;
        let records = self.records.lock();
        Ok(records
            .comments
            .iter()
            .filter(|c| c.product_id == product_id)
            .filter_map(|c| c.rating)
            .collect())
    }
}

#[async_trait]
impl RecordWriter for MemoryStore {
    async fn place_order(&self, order: NewOrder) -> Result<String, CakeRankError> {
        let mut records = self.records.lock();
        let id = records.next_id("order-");
        records.orders.push(StoredOrder {
            id: id.clone(),
            status: OrderStatus::Pending,
            items: order
                .items
                .into_iter()
                .map(|item| (item.cake_id, item.quantity))
                .collect(),
        });
        Ok(id)
    }

    async fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<bool, CakeRankError> {
        let mut records = self.records.lock();
        match records.orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) => {
                order.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_comment(&self, comment: NewComment) -> Result<String, CakeRankError> {
        let mut records = self.records.lock();
        let id = records.next_id("comment-");
        records.comments.push(StoredComment {
            id: id.clone(),
            product_id: comment.cake_id,
            rating: comment.rating,
        });
        Ok(id)
    }

    async fn update_comment(
        &self,
        comment_id: &str,
        patch: CommentPatch,
    ) -> Result<bool, CakeRankError> {
        let mut records = self.records.lock();
        match records.comments.iter_mut().find(|c| c.id == comment_id) {
            Some(comment) => {
                if patch.rating.is_some() {
                    comment.rating = patch.rating;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<bool, CakeRankError> {
        let mut records = self.records.lock();
        let before = records.comments.len();
        records.comments.retain(|c| c.id != comment_id);
        Ok(records.comments.len() < before)
    }
}

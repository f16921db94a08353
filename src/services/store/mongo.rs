use crate::config::Config;
use crate::error::CakeRankError;
use crate::model::{
    CommentPatch, CommentRecord, NewComment, NewOrder, OrderLineItem, OrderStatus, Product,
};
use crate::services::store::{RecordWriter, SignalSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection};
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CakeDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    product_name: String,
    #[serde(default)]
    description: Option<String>,
    price: f64,
    #[serde(default)]
    image: Option<String>,
    category: String,
    qty: i64,
    #[serde(default)]
    average_rating: Option<f64>,
    #[serde(default)]
    created_at: Option<BsonDateTime>,
}

impl From<CakeDocument> for Product {
    fn from(cake: CakeDocument) -> Self {
        Product {
            id: cake.id.to_hex(),
            name: cake.product_name,
            description: cake.description,
            price: cake.price,
            image: cake.image,
            category: cake.category,
            stock_qty: cake.qty,
            average_rating: cake.average_rating,
            created_at: cake
                .created_at
                .and_then(|ts| DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderDocument {
    #[serde(default)]
    order_status: Option<String>,
    #[serde(default)]
    ordered_items: Vec<OrderedItemDocument>,
}

impl OrderDocument {
    /// Orders without a recognised status are treated as pending
    fn status(&self) -> OrderStatus {
        self.order_status
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(OrderStatus::Pending)
    }
}

/// Legacy items may lack a cake reference; those are skipped
#[derive(Debug, Deserialize)]
struct OrderedItemDocument {
    #[serde(default)]
    cake: Option<ObjectId>,
    #[serde(default)]
    quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentDocument {
    #[serde(default)]
    cake_id: Option<ObjectId>,
    #[serde(default)]
    rating: Option<f64>,
}

/// MongoDB-backed record store over the cakes, orders and comments collections
pub struct MongoStore {
    cakes: Collection<CakeDocument>,
    orders: Collection<OrderDocument>,
    comments: Collection<CommentDocument>,
    raw_orders: Collection<Document>,
    raw_comments: Collection<Document>,
}

impl MongoStore {
    pub async fn connect(config: &Config) -> Result<Self, CakeRankError> {
        let mut client_options = ClientOptions::parse(&config.store.mongo_url).await?;
        client_options.app_name = Some("Cakerank".to_string());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.store.mongo_db);

        info!(
            db = %config.store.mongo_db,
            cakes = %config.store.cakes_collection,
            orders = %config.store.orders_collection,
            comments = %config.store.comments_collection,
            "Connected to MongoDB"
        );

        Ok(Self {
            cakes: db.collection(&config.store.cakes_collection),
            orders: db.collection(&config.store.orders_collection),
            comments: db.collection(&config.store.comments_collection),
            raw_orders: db.collection(&config.store.orders_collection),
            raw_comments: db.collection(&config.store.comments_collection),
        })
    }

    async fn find_orders(&self, filter: Document) -> Result<Vec<OrderDocument>, CakeRankError> {
        let find_options = FindOptions::builder()
            .projection(doc! { "orderStatus": 1, "orderedItems.cake": 1, "orderedItems.quantity": 1 })
            .build();

        let mut cursor = self.orders.find(filter, find_options).await?;
        let mut results = Vec::new();

        while let Some(order) = cursor.try_next().await? {
            results.push(order);
        }

        Ok(results)
    }

    async fn find_comments(&self, filter: Document) -> Result<Vec<CommentDocument>, CakeRankError> {
        let find_options = FindOptions::builder()
            .projection(doc! { "cakeId": 1, "rating": 1 })
            .build();

        let mut cursor = self.comments.find(filter, find_options).await?;
        let mut results = Vec::new();

        while let Some(comment) = cursor.try_next().await? {
            results.push(comment);
        }

        Ok(results)
    }
}

fn line_items(orders: Vec<OrderDocument>) -> Vec<OrderLineItem> {
    orders
        .into_iter()
        .flat_map(|order| {
            let status = order.status();
            order.ordered_items.into_iter().filter_map(move |item| {
                item.cake.map(|cake| OrderLineItem {
                    product_id: cake.to_hex(),
                    quantity: item.quantity.max(0) as u64,
                    status,
                })
            })
        })
        .collect()
}

fn comment_records(comments: Vec<CommentDocument>) -> Vec<CommentRecord> {
    comments
        .into_iter()
        .filter_map(|c| {
            c.cake_id.map(|cake_id| CommentRecord {
                product_id: cake_id.to_hex(),
                rating: c.rating,
            })
        })
        .collect()
}

fn status_exclusion(excluded: &[OrderStatus]) -> Document {
    let names: Vec<&str> = excluded.iter().map(OrderStatus::as_str).collect();
    doc! { "orderStatus": { "$nin": names } }
}

#[async_trait]
impl SignalSource for MongoStore {
    async fn list_products(&self) -> Result<Vec<Product>, CakeRankError> {
        let find_options = FindOptions::builder().sort(doc! { "_id": 1 }).build();

        let mut cursor = self.cakes.find(doc! {}, find_options).await?;
        let mut results = Vec::new();

        while let Some(cake) = cursor.try_next().await? {
            results.push(Product::from(cake));
        }

        debug!(count = results.len(), "Listed catalog products");
        Ok(results)
    }

    async fn list_order_line_items(
        &self,
        excluded: &[OrderStatus],
    ) -> Result<Vec<OrderLineItem>, CakeRankError> {
        let orders = self.find_orders(status_exclusion(excluded)).await?;
        let items = line_items(orders);

        debug!(line_items = items.len(), "Listed order line items");
        Ok(items)
    }

    async fn list_comments(&self) -> Result<Vec<CommentRecord>, CakeRankError> {
        let comments = self.find_comments(doc! {}).await?;
        let records = comment_records(comments);

        debug!(count = records.len(), "Listed comments");
        Ok(records)
    }
}

fn inserted_hex(inserted: &Bson) -> Result<String, CakeRankError> {
    inserted
        .as_object_id()
        .map(|oid| oid.to_hex())
        .ok_or_else(|| CakeRankError::Internal("Inserted id is not an ObjectId".to_string()))
}

#[async_trait]
impl RecordWriter for MongoStore {
    async fn place_order(&self, order: NewOrder) -> Result<String, CakeRankError> {
        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            items.push(doc! {
                "cake": ObjectId::parse_str(&item.cake_id)?,
                "quantity": item.quantity as i64,
            });
        }

        let result = self
            .raw_orders
            .insert_one(
                doc! {
                    "orderedItems": items,
                    "orderStatus": OrderStatus::Pending.as_str(),
                    "createdAt": BsonDateTime::now(),
                },
                None,
            )
            .await?;

        inserted_hex(&result.inserted_id)
    }

    async fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<bool, CakeRankError> {
        let oid = ObjectId::parse_str(order_id)?;
        let result = self
            .raw_orders
            .update_one(
                doc! { "_id": oid },
                doc! { "$set": { "orderStatus": status.as_str(), "updatedAt": BsonDateTime::now() } },
                None,
            )
            .await?;

        Ok(result.matched_count > 0)
    }

    async fn add_comment(&self, comment: NewComment) -> Result<String, CakeRankError> {
        let cake_id = ObjectId::parse_str(&comment.cake_id)?;
        let result = self
            .raw_comments
            .insert_one(
                doc! {
                    "cakeId": cake_id,
                    "text": comment.text,
                    "rating": comment.rating,
                    "createdAt": BsonDateTime::now(),
                },
                None,
            )
            .await?;

        inserted_hex(&result.inserted_id)
    }

    async fn update_comment(
        &self,
        comment_id: &str,
        patch: CommentPatch,
    ) -> Result<bool, CakeRankError> {
        let oid = ObjectId::parse_str(comment_id)?;

        let mut set = doc! { "updatedAt": BsonDateTime::now() };
        if let Some(text) = patch.text {
            set.insert("text", text);
        }
        if let Some(rating) = patch.rating {
            set.insert("rating", rating);
        }

        let result = self
            .raw_comments
            .update_one(doc! { "_id": oid }, doc! { "$set": set }, None)
            .await?;

        Ok(result.matched_count > 0)
    }

    async fn delete_comment(&self, comment_id: &str) -> Result<bool, CakeRankError> {
        let oid = ObjectId::parse_str(comment_id)?;
        let result = self.raw_comments.delete_one(doc! { "_id": oid }, None).await?;

        Ok(result.deleted_count > 0)
    }
}

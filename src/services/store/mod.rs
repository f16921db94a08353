//! Record-store contracts consumed by the popularity engine.
//!
//! The read side (`SignalSource`) is all the aggregator may touch. The write
//! side (`RecordWriter`) covers every mutation that changes a popularity
//! signal; callers of those methods owe the cache an invalidation once the
//! write has committed.

#[cfg(test)]
pub mod memory;
pub mod mongo;

pub use mongo::MongoStore;

use crate::error::CakeRankError;
use crate::model::{
    CommentPatch, CommentRecord, NewComment, NewOrder, OrderLineItem, OrderStatus, Product,
};
use async_trait::async_trait;

#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Every catalog product, in catalog enumeration order
    async fn list_products(&self) -> Result<Vec<Product>, CakeRankError>;

    /// Line items of all orders whose status is not in `excluded`
    async fn list_order_line_items(
        &self,
        excluded: &[OrderStatus],
    ) -> Result<Vec<OrderLineItem>, CakeRankError>;

    /// Every comment, rated or not
    async fn list_comments(&self) -> Result<Vec<CommentRecord>, CakeRankError>;
}

/// Per-product queries: the direct definition of each signal, one product at
/// a time. Only the equivalence check against the grouped pass uses them.
#[cfg(test)]
#[async_trait]
pub trait PerProductSource: Send + Sync {
    async fn sum_ordered_quantity(
        &self,
        product_id: &str,
        excluded: &[OrderStatus],
    ) -> Result<u64, CakeRankError>;

    async fn count_comments(&self, product_id: &str) -> Result<u64, CakeRankError>;

    /// Ratings of the product's comments that carry one
    async fn list_rated_comments(&self, product_id: &str) -> Result<Vec<f64>, CakeRankError>;
}

#[async_trait]
pub trait RecordWriter: Send + Sync {
    async fn place_order(&self, order: NewOrder) -> Result<String, CakeRankError>;

    /// Returns `false` when no order has the given id
    async fn set_order_status(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<bool, CakeRankError>;

    async fn add_comment(&self, comment: NewComment) -> Result<String, CakeRankError>;

    /// Returns `false` when no comment has the given id
    async fn update_comment(
        &self,
        comment_id: &str,
        patch: CommentPatch,
    ) -> Result<bool, CakeRankError>;

    /// Returns `false` when no comment has the given id
    async fn delete_comment(&self, comment_id: &str) -> Result<bool, CakeRankError>;
}

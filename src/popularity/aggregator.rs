//! Popularity aggregation over the record store.
//!
//! Computes, for every catalog product, the three raw signals (ordered
//! quantity, comment count, average rating) and the derived popularity score:
//!
//! `score = orders * 0.5 + rating * 2.0 + comments * 0.3`, rounded to two
//! decimals.

use crate::error::CakeRankError;
use crate::model::{Product, ProductSignal, EXCLUDED_STATUSES};
use crate::services::store::SignalSource;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const ORDER_WEIGHT: f64 = 0.5;
const RATING_WEIGHT: f64 = 2.0;
const COMMENT_WEIGHT: f64 = 0.3;

/// Round to two decimals, half away from zero
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn popularity_score(orders_count: u64, average_rating: f64, comments_count: u64) -> f64 {
    round2(
        orders_count as f64 * ORDER_WEIGHT
            + average_rating * RATING_WEIGHT
            + comments_count as f64 * COMMENT_WEIGHT,
    )
}

/// Average rating for a product: the precomputed value on the product when it
/// is non-zero, otherwise the mean of its rated comments, otherwise `0`.
pub fn resolve_average_rating(precomputed: Option<f64>, ratings: &[f64]) -> f64 {
    match precomputed {
        Some(avg) if avg != 0.0 => avg,
        _ if !ratings.is_empty() => ratings.iter().sum::<f64>() / ratings.len() as f64,
        _ => 0.0,
    }
}

pub fn build_signal(
    product: Product,
    orders_count: u64,
    comments_count: u64,
    ratings: &[f64],
) -> ProductSignal {
    let average_rating = resolve_average_rating(product.average_rating, ratings);

    ProductSignal {
        popularity_score: popularity_score(orders_count, average_rating, comments_count),
        average_rating: round2(average_rating),
        orders_count,
        comments_count,
        product_id: product.id,
        product_name: product.name,
        description: product.description,
        price: product.price,
        image: product.image,
        category: product.category,
        stock_qty: product.stock_qty,
        created_at: product.created_at,
    }
}

/// Sort descending by score; equal scores are ordered by ascending product id
pub fn rank(signals: &mut [ProductSignal]) {
    signals.sort_by(|a, b| {
        b.popularity_score
            .total_cmp(&a.popularity_score)
            .then_with(|| a.product_id.cmp(&b.product_id))
    });
}

#[derive(Default)]
struct Tally {
    orders: u64,
    comments: u64,
    ratings: Vec<f64>,
}

/// Computes the full ranked signal list in one grouped pass over products,
/// order line items and comments.
#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn SignalSource>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn SignalSource>) -> Self {
        Self { store }
    }

    /// Every catalog product with its signals, ranked. Store errors propagate
    /// unchanged; nothing is retried here.
    pub async fn compute(&self) -> Result<Vec<ProductSignal>, CakeRankError> {
        let products = self.store.list_products().await?;
        let line_items = self.store.list_order_line_items(EXCLUDED_STATUSES).await?;
        let comments = self.store.list_comments().await?;

        let mut tallies: HashMap<String, Tally> = HashMap::with_capacity(products.len());

        for item in line_items {
            if EXCLUDED_STATUSES.contains(&item.status) {
                continue;
            }
            tallies.entry(item.product_id).or_default().orders += item.quantity;
        }

        for comment in comments {
            let tally = tallies.entry(comment.product_id).or_default();
            tally.comments += 1;
            if let Some(rating) = comment.rating {
                tally.ratings.push(rating);
            }
        }

        let mut signals: Vec<ProductSignal> = products
            .into_iter()
            .map(|product| {
                let tally = tallies.remove(&product.id).unwrap_or_default();
                build_signal(product, tally.orders, tally.comments, &tally.ratings)
            })
            .collect();

        rank(&mut signals);

        debug!(
            products = signals.len(),
            orphaned = tallies.len(),
            "Aggregated popularity signals"
        );

        Ok(signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderStatus;
    use crate::services::store::memory::MemoryStore;
    use crate::services::store::PerProductSource;

    /// Per-product definition: every product re-queries the store for its own
    /// orders and comments.
    async fn compute_per_product(
        store: &MemoryStore,
    ) -> Result<Vec<ProductSignal>, CakeRankError> {
        let mut signals = Vec::new();
        for product in store.list_products().await? {
            let orders = store
                .sum_ordered_quantity(&product.id, EXCLUDED_STATUSES)
                .await?;
            let comments = store.count_comments(&product.id).await?;
            let ratings = store.list_rated_comments(&product.id).await?;
            signals.push(build_signal(product, orders, comments, &ratings));
        }
        rank(&mut signals);
        Ok(signals)
    }

    fn bakery_fixture() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_product(MemoryStore::product("a", "Chocolate Fudge", None));
        store.add_product(MemoryStore::product("b", "Lemon Drizzle", Some(3.0)));
        store.add_product(MemoryStore::product("c", "Carrot Cake", None));
        store.add_product(MemoryStore::product("d", "Plain Sponge", None));
        store.add_product(MemoryStore::product("e", "Plain Sponge II", None));

        store.add_order(OrderStatus::Delivered, &[("a", 4), ("b", 10)]);
        store.add_order(OrderStatus::Pending, &[("a", 6), ("b", 10), ("c", 1)]);
        store.add_order(OrderStatus::Cancelled, &[("c", 50)]);
        store.add_order(OrderStatus::Shipped, &[("zz-deleted", 3)]);

        for rating in [5.0, 4.0, 4.5, 4.5] {
            store.add_rating("a", Some(rating));
        }
        store.add_rating("a", None);
        store.add_rating("a", None);
        store.add_rating("b", Some(1.0));
        store.add_rating("b", None);
        store.add_rating("c", Some(3.3));
        store
    }

    #[test]
    fn test_score_formula() {
        assert_eq!(popularity_score(10, 4.5, 6), 15.8);
        assert_eq!(popularity_score(20, 3.0, 2), 16.6);
        assert_eq!(popularity_score(0, 0.0, 0), 0.0);
        assert_eq!(popularity_score(1, 0.0, 1), 0.8);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round2(1.125), 1.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(2.675_1), 2.68);
        assert_eq!(round2(-2.675_1), -2.68);
        assert_eq!(round2(0.125), 0.13);
    }

    #[test]
    fn test_score_monotonic_in_each_signal() {
        let ratings = [0.0, 0.5, 1.25, 2.0, 3.33, 4.5, 5.0];
        for o in 0..30u64 {
            for c in 0..30u64 {
                for r in ratings {
                    let base = popularity_score(o, r, c);
                    assert!(popularity_score(o + 1, r, c) >= base);
                    assert!(popularity_score(o, r, c + 1) >= base);
                    assert!(popularity_score(o, (r + 0.25).min(5.0), c) >= base);
                }
            }
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let a = popularity_score(17, 3.7142857142857144, 9);
        let b = popularity_score(17, 3.7142857142857144, 9);
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn test_resolve_average_rating() {
        assert_eq!(resolve_average_rating(Some(4.2), &[1.0]), 4.2);
        assert_eq!(resolve_average_rating(Some(0.0), &[4.0, 5.0]), 4.5);
        assert_eq!(resolve_average_rating(None, &[3.0]), 3.0);
        assert_eq!(resolve_average_rating(None, &[]), 0.0);
    }

    #[test]
    fn test_rank_breaks_ties_by_product_id() {
        let store_products = ["m", "c", "x"];
        let mut signals: Vec<ProductSignal> = store_products
            .iter()
            .map(|id| build_signal(MemoryStore::product(id, id, None), 2, 0, &[]))
            .collect();
        signals.push(build_signal(MemoryStore::product("z", "z", None), 9, 0, &[]));

        rank(&mut signals);
        let ids: Vec<&str> = signals.iter().map(|s| s.product_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "c", "m", "x"]);
    }

    #[test]
    fn test_rank_is_total_with_nan_rating() {
        let mut signals: Vec<ProductSignal> = ["p", "q", "r"]
            .iter()
            .enumerate()
            .map(|(i, id)| build_signal(MemoryStore::product(id, id, None), i as u64 * 4, 0, &[]))
            .collect();
        signals.push(build_signal(
            MemoryStore::product("n", "n", Some(f64::NAN)),
            1,
            0,
            &[],
        ));

        rank(&mut signals);
        assert!(signals[0].popularity_score.is_nan());
        let ids: Vec<&str> = signals[1..].iter().map(|s| s.product_id.as_str()).collect();
        assert_eq!(ids, vec!["r", "q", "p"]);
    }

    #[tokio::test]
    async fn test_example_ranking() {
        let store = Arc::new(MemoryStore::new());
        store.add_product(MemoryStore::product("a", "Product A", Some(4.5)));
        store.add_product(MemoryStore::product("b", "Product B", Some(3.0)));
        store.add_order(OrderStatus::Confirmed, &[("a", 10), ("b", 20)]);
        for _ in 0..6 {
            store.add_rating("a", None);
        }
        for _ in 0..2 {
            store.add_rating("b", None);
        }

        let signals = Aggregator::new(store).compute().await.unwrap();

        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].product_id, "b");
        assert_eq!(signals[0].popularity_score, 16.6);
        assert_eq!(signals[1].product_id, "a");
        assert_eq!(signals[1].popularity_score, 15.8);
    }

    #[tokio::test]
    async fn test_signals_from_fixture() {
        let store = bakery_fixture();
        let signals = Aggregator::new(store).compute().await.unwrap();

        let a = signals.iter().find(|s| s.product_id == "a").unwrap();
        assert_eq!(a.orders_count, 10);
        assert_eq!(a.comments_count, 6);
        assert_eq!(a.average_rating, 4.5);

        // Precomputed rating wins over comment ratings
        let b = signals.iter().find(|s| s.product_id == "b").unwrap();
        assert_eq!(b.average_rating, 3.0);
        assert_eq!(b.orders_count, 20);

        // Cancelled orders do not count
        let c = signals.iter().find(|s| s.product_id == "c").unwrap();
        assert_eq!(c.orders_count, 1);

        // Every catalog product is present, even without signals
        assert_eq!(signals.len(), 5);
        let d = signals.iter().find(|s| s.product_id == "d").unwrap();
        assert_eq!(d.popularity_score, 0.0);
        assert_eq!(d.average_rating, 0.0);

        for pair in signals.windows(2) {
            assert!(pair[0].popularity_score >= pair[1].popularity_score);
        }
    }

    #[tokio::test]
    async fn test_grouped_pass_matches_per_product_definition() {
        let store = bakery_fixture();

        let grouped = Aggregator::new(store.clone()).compute().await.unwrap();
        let per_product = compute_per_product(&store).await.unwrap();

        assert_eq!(grouped, per_product);
    }

    #[tokio::test]
    async fn test_grouped_pass_reads_each_collection_once() {
        let store = bakery_fixture();
        Aggregator::new(store.clone()).compute().await.unwrap();
        assert_eq!(store.read_calls(), 3);
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = bakery_fixture();
        store.set_failing(true);

        let result = Aggregator::new(store).compute().await;
        assert!(matches!(result, Err(CakeRankError::StoreRead(_))));
    }
}

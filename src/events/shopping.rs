//! Shopping application actions
//!
//! Shopping sessions walk a funnel: browse -> product view -> cart ->
//! checkout -> purchase, with some wandering back to browsing. Product
//! indices are bounded by the listing page size on listing pages and by
//! the default page size everywhere else.

use super::Action;
use crate::config::MIN_PRODUCT_PAGE;
use crate::error::GenerationError;
use rand::rngs::StdRng;
use rand::Rng;
use serde_json::Map;

/// Position within the shopping funnel for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunnelStage {
    Browsing,
    ViewingProduct,
    CartReady,
    CheckingOut,
}

/// Stateful action emitter for the shopping application
#[derive(Debug)]
pub struct ShoppingActions {
    main_page_product_count: u32,
    default_product_count: u32,
    stage: FunnelStage,
}

impl ShoppingActions {
    /// New emitter with the configured page sizes
    ///
    /// # Errors
    /// Fails when either page holds fewer than [`MIN_PRODUCT_PAGE`]
    /// products. The size is never clamped.
    pub fn new(
        main_page_product_count: u32,
        default_product_count: u32,
    ) -> Result<Self, GenerationError> {
        for got in [main_page_product_count, default_product_count] {
            if got < MIN_PRODUCT_PAGE {
                return Err(GenerationError::ProductPageTooSmall {
                    got,
                    min: MIN_PRODUCT_PAGE,
                });
            }
        }
        Ok(Self {
            main_page_product_count,
            default_product_count,
            stage: FunnelStage::Browsing,
        })
    }

    /// Restart the funnel at browsing
    pub fn begin_session(&mut self) {
        self.stage = FunnelStage::Browsing;
    }

    fn product_attrs(&self, rng: &mut StdRng, page_size: u32) -> Map<String, serde_json::Value> {
        let index = rng.gen_range(0..page_size);
        let mut attributes = Map::new();
        attributes.insert("item_index".into(), index.into());
        attributes.insert("item_id".into(), format!("product_{index}").into());
        attributes
    }

    /// Emit the next funnel action and advance the stage
    pub fn next_action(&mut self, rng: &mut StdRng) -> Action {
        match self.stage {
            FunnelStage::Browsing => match rng.gen_range(0..4) {
                0 => {
                    let mut attributes = Map::new();
                    attributes.insert("screen_name".into(), "main".into());
                    attributes.insert("item_count".into(), self.main_page_product_count.into());
                    Action {
                        name: "view_item_list",
                        attributes,
                    }
                }
                1 => {
                    let mut attributes = Map::new();
                    attributes.insert("search_term".into(), format!("q{}", rng.gen_range(0..100)).into());
                    Action {
                        name: "search",
                        attributes,
                    }
                }
                _ => {
                    // Selected off the main listing page
                    self.stage = FunnelStage::ViewingProduct;
                    Action {
                        name: "view_item",
                        attributes: self.product_attrs(rng, self.main_page_product_count),
                    }
                }
            },
            FunnelStage::ViewingProduct => match rng.gen_range(0..4) {
                0 => {
                    // Related product on a detail page
                    Action {
                        name: "view_item",
                        attributes: self.product_attrs(rng, self.default_product_count),
                    }
                }
                1 => {
                    self.stage = FunnelStage::Browsing;
                    let mut attributes = Map::new();
                    attributes.insert("screen_name".into(), "main".into());
                    Action {
                        name: "screen_view",
                        attributes,
                    }
                }
                _ => {
                    self.stage = FunnelStage::CartReady;
                    let mut attributes = self.product_attrs(rng, self.default_product_count);
                    attributes.insert("quantity".into(), rng.gen_range(1..4u32).into());
                    Action {
                        name: "add_to_cart",
                        attributes,
                    }
                }
            },
            FunnelStage::CartReady => match rng.gen_range(0..3) {
                0 => Action::named("view_cart"),
                1 => {
                    self.stage = FunnelStage::ViewingProduct;
                    Action {
                        name: "view_item",
                        attributes: self.product_attrs(rng, self.default_product_count),
                    }
                }
                _ => {
                    self.stage = FunnelStage::CheckingOut;
                    Action::named("begin_checkout")
                }
            },
            FunnelStage::CheckingOut => {
                self.stage = FunnelStage::Browsing;
                let mut attributes = Map::new();
                attributes.insert("order_id".into(), format!("{:012x}", rng.gen::<u64>()).into());
                attributes.insert("value".into(), rng.gen_range(1..500u32).into());
                Action {
                    name: "purchase",
                    attributes,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_rejects_undersized_pages() {
        assert_eq!(
            ShoppingActions::new(1, 2).unwrap_err(),
            GenerationError::ProductPageTooSmall { got: 1, min: 2 }
        );
        assert_eq!(
            ShoppingActions::new(4, 0).unwrap_err(),
            GenerationError::ProductPageTooSmall { got: 0, min: 2 }
        );
    }

    #[test]
    fn test_item_index_within_listing_bound() {
        let mut emitter = ShoppingActions::new(4, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(17);

        emitter.begin_session();
        for _ in 0..500 {
            let action = emitter.next_action(&mut rng);
            if let Some(index) = action.attributes.get("item_index") {
                let index = index.as_u64().unwrap();
                assert!(index < 4, "index {index} escaped the listing page");
            }
        }
    }

    #[test]
    fn test_purchase_requires_checkout_first() {
        let mut emitter = ShoppingActions::new(4, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(23);

        for _ in 0..20 {
            emitter.begin_session();
            let mut checkout_seen = false;
            let mut purchases = 0;
            for _ in 0..100 {
                let action = emitter.next_action(&mut rng);
                match action.name {
                    "begin_checkout" => checkout_seen = true,
                    "purchase" => {
                        assert!(checkout_seen, "purchase before begin_checkout");
                        purchases += 1;
                        checkout_seen = false;
                    }
                    _ => {}
                }
            }
            let _ = purchases;
        }
    }

    #[test]
    fn test_funnel_restarts_per_session() {
        let mut emitter = ShoppingActions::new(4, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(31);

        // Drive the funnel forward, then verify a new session starts browsing.
        for _ in 0..50 {
            emitter.next_action(&mut rng);
        }
        emitter.begin_session();
        assert_eq!(emitter.stage, FunnelStage::Browsing);
    }
}

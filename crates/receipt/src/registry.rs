//! Maps classified store ids to extraction handlers.
//!
//! Resolution never fails: ids without a dedicated handler fall through a
//! vendor-keyword table and finally land on the generic handler, so every
//! receipt gets processed by something.

use crate::handlers::costco::CostcoHandler;
use crate::handlers::generic::GenericHandler;
use crate::handlers::h_mart::HMartHandler;
use crate::handlers::key_food::KeyFoodHandler;
use crate::handlers::trader_joes::TraderJoesHandler;
use crate::handlers::walmart::WalmartHandler;
use crate::handlers::ExtractReceipt;

/// Ids with a dedicated handler, in registration order.
pub const REGISTERED: &[&str] =
    &["costco", "trader_joes", "h_mart", "key_food", "walmart", "generic"];

/// Keywords that map free-form store ids (classifier header guesses, chains
/// without their own handler) onto a registered handler.
const VENDOR_KEYWORDS: &[(&str, &[&str])] = &[
    ("costco", &["costco", "wholesale"]),
    ("trader_joes", &["trader", "joe"]),
    ("h_mart", &["h mart", "h-mart", "hmart"]),
    ("key_food", &["key food", "keyfood"]),
    ("walmart", &["walmart", "wal-mart", "wal mart"]),
    ("generic", &["target", "kroger", "safeway", "publix", "whole foods", "aldi"]),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerRegistry;

impl HandlerRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Handler for a classified store id.
    pub fn resolve(&self, store_id: &str) -> Box<dyn ExtractReceipt> {
        let id = normalize(store_id);
        if let Some(handler) = build(&id) {
            return handler;
        }
        for (handler_id, keywords) in VENDOR_KEYWORDS {
            if keywords.iter().any(|k| id.contains(k)) {
                if let Some(handler) = build(handler_id) {
                    return handler;
                }
            }
        }
        Box::new(GenericHandler)
    }

    /// Resolve a caller-forced handler name. Unregistered names are not an
    /// error; resolution just proceeds from the classified store id.
    pub fn resolve_forced(&self, name: &str, store_id: &str) -> Box<dyn ExtractReceipt> {
        match build(&normalize(name)) {
            Some(handler) => handler,
            None => {
                tracing::warn!(handler = name, "forced handler not registered, resolving normally");
                self.resolve(store_id)
            }
        }
    }
}

fn build(id: &str) -> Option<Box<dyn ExtractReceipt>> {
    let handler: Box<dyn ExtractReceipt> = match id {
        "costco" => Box::new(CostcoHandler),
        "trader_joes" => Box::new(TraderJoesHandler),
        "h_mart" => Box::new(HMartHandler),
        "key_food" => Box::new(KeyFoodHandler),
        "walmart" => Box::new(WalmartHandler),
        "generic" => Box::new(GenericHandler),
        _ => return None,
    };
    Some(handler)
}

fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_ids_resolve_to_their_handler() {
        let registry = HandlerRegistry::new();
        for id in REGISTERED {
            assert_eq!(registry.resolve(id).name(), *id);
        }
    }

    #[test]
    fn resolution_is_case_and_whitespace_insensitive() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.resolve(" COSTCO ").name(), "costco");
    }

    #[test]
    fn vendor_keywords_map_free_form_ids() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.resolve("costco wholesale #512").name(), "costco");
        assert_eq!(registry.resolve("trader joes east").name(), "trader_joes");
        assert_eq!(registry.resolve("h-mart flushing").name(), "h_mart");
        assert_eq!(registry.resolve("target store 55").name(), "generic");
    }

    #[test]
    fn unknown_ids_fall_back_to_generic() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.resolve("sunny deli").name(), "generic");
        assert_eq!(registry.resolve("unknown").name(), "generic");
        assert_eq!(registry.resolve("").name(), "generic");
    }

    #[test]
    fn forced_names_win_and_bad_ones_fall_through() {
        let registry = HandlerRegistry::new();
        assert_eq!(registry.resolve_forced("walmart", "costco").name(), "walmart");
        assert_eq!(registry.resolve_forced("bogus", "costco").name(), "costco");
    }

    #[test]
    fn every_handler_tolerates_garbage() {
        let registry = HandlerRegistry::new();
        for id in REGISTERED {
            for text in ["", "INVALID RECEIPT CONTENT", "\n\n\n", "123 456 789"] {
                let result = registry.resolve(id).process_receipt(text);
                assert!(result.items.is_empty(), "{id} extracted items from {text:?}");
                assert_eq!(result.total, None, "{id} found a total in {text:?}");
            }
        }
    }
}

//! Category trees and path folding

pub mod category_tree;
pub mod folding;
pub mod kpved_tree;

pub use category_tree::{CategoryNode, CategoryTree};
pub use folding::{
    FoldedCategory, FoldingEngine, FoldingPriority, FoldingRule, FoldingStrategyConfig,
    DEFAULT_MAX_DEPTH, DEFAULT_SEPARATOR, DEFAULT_STRATEGY_ID,
};
pub use kpved_tree::{build_tree, load_tree, KpvedRow};

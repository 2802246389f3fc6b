//! Core types for the shop synchronization layer.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod id;
pub mod page;
pub mod price;
pub mod product;

pub use cart::{CartLine, CartLineDetail, Resolution, ResolutionWarning};
pub use id::*;
pub use page::{FetchedPage, total_pages};
pub use price::{CurrencyCode, Price, PriceParseError, round_currency};
pub use product::{PLACEHOLDER_NAME, Product};

//! Name derivation for routes, permissions and metadata keys.
//!
//! Type names are matched without regard to case everywhere: record
//! upserts, uniqueness checks, metadata keys and route slugs all go
//! through `record_key` or `kebab_case`.

use convert_case::{Case, Casing};

/// Path segments generated routes already use under `/{app_id}/`.
pub const RESERVED_SLUGS: &[&str] = &["dashboard"];

/// Kebab-case a type name for use in a URL path.
///
/// `PRODUCT` → `product`, `SALES_ORDER` → `sales-order`,
/// `SalesOrder` → `sales-order`.
pub fn kebab_case(name: &str) -> String {
    name.to_case(Case::Kebab)
}

/// Permission prefix for a type: the type name uppercased.
///
/// `SALES_ORDER` → `SALES_ORDER`, `product` → `PRODUCT`
pub fn permission_prefix(type_name: &str) -> String {
    type_name.trim().to_uppercase()
}

/// Case-folded identity of a type name or record id.
pub fn record_key(name: &str) -> String {
    name.to_lowercase()
}

/// Metadata key: `{app_id}.{type_lowercased}`.
pub fn metadata_key(app_id: &str, type_name: &str) -> String {
    format!("{}.{}", app_id, record_key(type_name))
}

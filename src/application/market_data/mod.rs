// Latest-price-per-symbol cache
pub mod price_cache;

// Three-layer tradable-symbol allowlist
pub mod allow_list_service;

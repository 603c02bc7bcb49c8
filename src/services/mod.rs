pub mod format;
pub mod orders;
pub mod products;
pub mod reservations;
pub mod settings;
pub mod transaction_key;

pub mod serde_named;

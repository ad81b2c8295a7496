pub mod admin;
pub mod source;

pub use admin::{AdminAuthenticator, HmacAdminAuthenticator, digest_password, generate_key};
pub use source::{
    EmbeddingSource, Frame, LocalEmbeddingSource, NoReceipts, ReceiptService, SourceOutcome,
};

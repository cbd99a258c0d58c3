//! Data models shared by the storage, API, and session layers.
//!
//! - `UserProfile`, `Credential`, `AuthTokens`: what a signed-in device holds
//! - `Post`, `PostDraft`: the sample REST resource

pub mod post;
pub mod user;

pub use post::{seed_posts, Post, PostDraft};
pub use user::{AuthTokens, Credential, UserProfile};

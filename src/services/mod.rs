//! Services layer - Business logic
//!
//! Services validate input, enforce business rules and coordinate
//! repositories with the object store. They hold only shared handles
//! and keep no per-request state.

pub mod auth;
pub mod catalog;
pub mod content;
pub mod file;
pub mod password;
pub mod token;

pub use auth::{
    AuthResponse, AuthService, AuthServiceError, LoginInput, RegisterInput, UserResponse,
};
pub use catalog::{CatalogService, CatalogServiceError};
pub use content::{ContentService, ContentServiceError};
pub use file::{FileServiceError, FileStorageService};
pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenService};

mod manager;
mod token;
mod types;

pub use manager::ShareLinkManager;
pub use token::{generate_share_token, TOKEN_BYTES};
pub use types::{CreateShareTokenInput, CreatedShareLink, SharePermission, ShareToken};

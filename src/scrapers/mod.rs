pub mod browser;
pub mod traits;
pub mod types;
pub mod ur;

pub use browser::UrBrowser;

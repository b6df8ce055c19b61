pub mod account_manager;

pub use account_manager::AccountManager;

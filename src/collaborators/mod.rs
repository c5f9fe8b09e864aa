pub mod identity;
pub mod orders;
pub mod wallet;

pub use identity::{IdentityService, InMemoryIdentity, Role, UserProfile};
pub use orders::{InMemoryOrders, OrderHistoryEntry, OrderService, OrderSnapshot, OrderStatus};
pub use wallet::{InMemoryWallet, Wallet, WalletReceipt};

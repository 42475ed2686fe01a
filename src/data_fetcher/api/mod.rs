pub mod date_logic;
pub mod http_client;
pub mod urls;

pub use date_logic::*;
pub use http_client::*;
pub use urls::*;

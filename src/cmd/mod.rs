//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `services` | `Services`       |
//! | `config`   | `Config`         |

pub mod config;
pub mod serve;
pub mod services;

pub use config::cmd_config;
pub use serve::cmd_serve;
pub use services::cmd_services;

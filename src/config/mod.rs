pub mod schema;

pub use schema::{AgentsConfig, Config, GatewayConfig, MemoryConfig, PersonaConfig};

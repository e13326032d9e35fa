pub mod config;
pub mod http_client;
pub mod llm_client;
pub mod runtime;
pub mod schema;
pub mod server;
pub mod structured;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

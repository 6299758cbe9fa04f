pub mod candle_source;
pub mod credential_store;
pub mod exchange_client;

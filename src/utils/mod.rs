pub mod candle;
pub mod db_connect;
pub mod env;
pub mod pipeline_config;
pub mod progress_bars;

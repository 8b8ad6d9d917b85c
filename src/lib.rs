#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod ws;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub use ws::{
    Config, ConnectionManager, ConnectionState, LocalEvent, NetworkStatus, ReconnectConfig,
    Status, Subscription, Visibility,
};

//! Route handlers.

pub mod front;
pub mod health;
pub mod login;
pub mod logout;

use axum::extract::ConnectInfo;
use std::net::SocketAddr;

fn peer(connect_info: Option<ConnectInfo<SocketAddr>>) -> Option<SocketAddr> {
    connect_info.map(|ConnectInfo(addr)| addr)
}

pub mod bus;
pub mod config;
pub mod decision;
pub mod domain {
    pub mod events;
    pub mod payment;
}
pub mod http;
pub mod repo;
pub mod service {
    pub mod lookup_service;
    pub mod order_placed_consumer;
    pub mod stream_worker;
}

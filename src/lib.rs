// BGP Route Audit - looking-glass collection, upstream propagation and router feed audits

pub mod collect;
pub mod config;
pub mod error;
pub mod lookingglass;
pub mod report;
pub mod router;
pub mod routes;

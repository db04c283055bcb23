//! Process Supervision Engine
//!
//! A library for discovering, tracking, health-checking, restarting, and
//! pooling OS processes:
//! - Cross-platform process discovery and a reconciled in-memory registry
//! - Configurable health checks with hysteresis and sustained-breach windows
//! - Policy-driven auto-restart with backoff and rate limiting
//! - Worker pools with autoscaling and load balancing over real subprocesses
//! - An in-memory IPC broker for supervisor/worker message exchange

pub mod adapters;
pub mod config;
pub mod domain;
pub mod health;
pub mod ipc;
pub mod pool;
pub mod ports;
pub mod registry;
pub mod restart;
pub mod storage;
pub mod supervisor;
pub mod sync;

pub use config::SupervisorConfig;
pub use domain::{Result, SupervisorError};
pub use supervisor::{ProcessTreeNode, Supervisor};

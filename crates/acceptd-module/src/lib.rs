//! # acceptd-module: Default (safe) implementations
//!
//! This crate provides the default implementation for every acceptd trait.
//! Each impl prioritizes correctness and simplicity over performance.
//!
//! ## Default stack
//!
//! | Trait              | Default Impl       | Notes                        |
//! |--------------------|--------------------|------------------------------|
//! | Multiplexer        | EpollMultiplexer   | Linux only (epoll)           |
//! | ConnectionSource   | TcpAcceptSocket    | Linux only (accept4)         |
//! | WorkerPool         | FixedPool          | portable                     |

pub mod fixed_pool;

pub use fixed_pool::FixedPool;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod epoll;
        pub mod listener;

        pub use epoll::EpollMultiplexer;
        pub use listener::TcpAcceptSocket;
    } else {
        compile_error!("acceptd-module needs epoll and accept4; only Linux is supported");
    }
}

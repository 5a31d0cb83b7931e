//! # Demo Command-Line Interface
//!
//! Argument parsing for `src/bin/jennynet_demo.rs`, the thin server
//! accept loop the specification scopes in ("a thin server accept loop
//! is covered only to the extent it produces fresh connection
//! engines"). Not a test harness or reflect server — those remain out
//! of scope. Modelled on the teacher's `clap`-derive `Args` struct,
//! trimmed to the handful of knobs a demo needs.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};

/// JennyNet demo — runs either a listening server or a one-shot client
/// against it, to exercise the accept core and a single round trip.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Bind and accept connections, printing received objects.
    Serve {
        /// Address to bind to.
        #[arg(short, long, default_value = "127.0.0.1:7070")]
        addr: SocketAddr,
    },
    /// Connect to a running server and send one text object.
    Send {
        /// Server address to connect to.
        #[arg(short, long, default_value = "127.0.0.1:7070")]
        addr: SocketAddr,
        /// Text to send as a single user object.
        #[arg(short, long, default_value = "hello from jennynet")]
        message: String,
    },
}

//! URD RTE - realtime client for the Universal Robots primary interface
//!
//! Connects to the controller, keeps the connection alive across drops,
//! and turns the binary packet stream into typed, serializable messages
//! plus a merged snapshot of the running program's global variables.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use urd_rte::{Config, FaultPolicy, RealtimeMessage, RteClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::for_host("192.168.1.10");
//!     let faults = FaultPolicy::from_config(&config.monitor)?;
//!
//!     let mut client = RteClient::from_config(&config);
//!     let mut messages = client.connect().await?;
//!
//!     while let Some(message) = messages.next().await {
//!         if let Some(fault) = faults.check(&message) {
//!             eprintln!("{}", fault);
//!             break;
//!         }
//!         if let RealtimeMessage::DataPackage(package) = &message {
//!             println!("{:?}", package.variables);
//!         }
//!     }
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Transport**: reconnecting TCP socket (or any [`Transport`]) producing [`SocketEvent`]s
//! - **RealtimeClient**: debounced connection state and the public [`MessageStream`]
//! - **PacketFramer**: reassembles length-prefixed packets from socket chunks
//! - **MessageDecoder**: per-connection, version-gated packet decoding
//! - **VariableCodec**: typed global variable values
//! - **DataPackage**: merged name to value snapshot of global variables

pub mod client;
pub mod config;
pub mod data_package;
pub mod error;
pub mod faults;
pub mod framer;
pub mod messages;
pub mod output;
pub mod rte;
pub mod transport;
pub mod variables;
pub mod wire;

pub use client::{ClientLink, ConnectionState, MessageStream, RealtimeClient, RealtimeProtocol};
pub use config::{Config, ConnectionConfig, ControllerConfig, MonitorConfig};
pub use data_package::{DataPackage, DataPackageMessage};
pub use error::{DecodeError, FramingError, Result, RteError};
pub use faults::{FaultKind, FaultPolicy, RobotFault};
pub use framer::{Packet, PacketFramer};
pub use messages::{DecodedMessage, MessageDecoder, MessageScope, ProtocolVersion, RealtimeMessage};
pub use output::{ConsoleSink, MessageSink, NoOpSink};
pub use rte::{RteClient, RteProtocol};
pub use transport::{
    FibonacciBackoff, MockTransport, MockTransportHandle, ReconnectingSocket, SocketEvent, SocketOptions,
    Transport,
};
pub use variables::{decode_variable, TypeGeneration, TypeTables, VariableCodec, VariableKind, VariableValue};

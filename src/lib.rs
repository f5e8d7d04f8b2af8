//! # rfile - Remote File Management over Pooled SSH Connections
//!
//! `rfile` manages the content, mode and ownership of files on remote hosts
//! over SSH. It is the engine behind a declarative infrastructure provider:
//! the tool resolves its configuration into descriptors, and `rfile` makes the
//! remote file match them, reads the remote state back, or removes the file.
//!
//! ## Features
//!
//! - **Connection Pooling**: One SSH connection per host, user, port and credentials, shared by reference count
//! - **Admission Control**: At most N concurrent users per connection, further callers wait their turn
//! - **Two Access Strategies**: SFTP/SCP for unprivileged access, `sudo` shell commands for elevated access
//! - **Ownership and Modes**: `chmod`, `chown` and `chgrp` with numeric ids or names
//! - **Precise Diagnostics**: Failed commands keep their command text, cause and stderr
//! - **Async/Await**: Built on Tokio
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rfile::descriptor::{ConnectionDescriptor, FileDescriptor, Permissions};
//! use rfile::resource::{FileResource, ProviderDefaults};
//! use rfile::session::ConnectionPool;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = ConnectionPool::new();
//!     let defaults = ProviderDefaults::new(Some(
//!         ConnectionDescriptor::new("192.168.1.10", "deploy").with_password("secret"),
//!     ));
//!     let files = FileResource::new(&pool, &defaults);
//!
//!     let motd = FileDescriptor::new("/tmp/motd")
//!         .with_content("maintenance at 22:00\n")
//!         .with_permissions(Permissions::new("0644")?);
//!
//!     let created = files.create(None, &motd).await?;
//!     println!("managing {}", created.value.id);
//!
//!     if let Some(state) = files.read(None, &motd).await?.into_value() {
//!         println!("remote mode is {}", state.file.permissions);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::ConnectionPool`] - Reference-counted SSH connection pool
//! - [`files::RemoteFileOps`] - File operations on one acquired session
//! - [`resource::FileResource`] - Create, read, update, delete and inspect flows
//! - [`error::RemoteError`] - Error types, classified by [`error::ErrorKind`]
//! - [`config`] - Defaults and pool tuning

pub mod config;
pub mod descriptor;
pub mod error;
pub mod files;
pub mod resource;
pub mod session;

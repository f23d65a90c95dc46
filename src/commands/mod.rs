//! # Commands Module
//!
//! This module contains the two command handlers for lantunnel:
//!
//! ## `send`
//! Handles sending a file to a receiver:
//! - Advertises the sender over mDNS
//! - Accepts one TCP connection from a receiver
//! - Hashes the file and sends the session header
//! - Streams encrypted chunks and waits for the receiver's verdict
//!
//! ## `receive`
//! Handles receiving a file from a sender:
//! - Discovers an advertised sender over mDNS
//! - Dials the sender and reads the session header
//! - Decrypts, writes, and hashes the stream in one pass
//! - Verifies integrity and replies with the ACK/NACK byte

pub mod receive;
pub mod send;

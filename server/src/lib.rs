//! Hunt server library.
//!
//! An authoritative UDP server for a creature-hunting game. The live loop in
//! [`world`] runs combat, creature AI and spawning on a fixed tick; [`afk`]
//! pays out time spent away analytically. Both hand their rewards to the
//! same [`ledger::RewardLedger`].

pub mod afk;
pub mod clock;
pub mod config;
pub mod entities;
pub mod error;
pub mod ledger;
pub mod network;
pub mod persistence;
pub mod world;

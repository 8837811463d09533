// src/lib.rs
//! Voting-session backend: agendas, timed voting sessions, one vote per voter
//! identifier per agenda, and tallies.

pub mod agenda;
pub mod clock;
pub mod config;
pub mod db;
pub mod eligibility;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod pautas;
pub mod repository;
pub mod routes;
pub mod session;
pub mod state;
pub mod voting;

//! Command handlers

pub mod codes;
pub mod config;
pub mod fragments;
pub mod lock_demo;
pub mod merge;
pub mod search;
pub mod split;

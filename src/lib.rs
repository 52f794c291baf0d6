// src/lib.rs - Library root for the FLSurf work-session tracker

pub mod capture;
pub mod cli;
pub mod gateway;
pub mod infra;
pub mod tracking;

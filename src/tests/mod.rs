//! Shared fixtures and cross-module scenarios.


mod analysis_run;

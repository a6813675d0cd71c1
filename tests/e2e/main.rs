//! E2E test suite entry point.

mod corpus_workflow;
mod degraded_backends;
mod fixture;
mod fusion_scenarios;
mod rerank_workflow;
mod cache_workflow;

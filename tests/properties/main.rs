//! Property-based test suite entry point.

mod fusion_props;

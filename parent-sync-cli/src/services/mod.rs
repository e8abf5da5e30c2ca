// Business logic services layer
//
// Services depend on the CRM only through the facade trait, so the CLI and
// the tests can drive them against any backend.

pub mod reconcile;

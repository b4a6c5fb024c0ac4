//! Ambient pieces shared by every crate in the workspace: logging setup,
//! prometheus counters, and small process-environment helpers.

pub mod env;
pub mod metrics;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_type_ok() {
        let h = types::Health { status: "ok" };
        assert_eq!(h.status, "ok");
    }
}

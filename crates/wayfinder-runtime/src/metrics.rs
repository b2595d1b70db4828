//! Metric names and recording helpers. Recording is a no-op until a
//! recorder is installed by the binary.

pub const REGISTRATION_ATTEMPTS: &str = "wayfinder_registration_attempts_total";
pub const LOOKUPS: &str = "wayfinder_lookups_total";
pub const INSTANCES_PRUNED: &str = "wayfinder_instances_pruned_total";
pub const OPERATIONS: &str = "wayfinder_operations_total";

pub fn registration_attempt() {
    ::metrics::counter!(REGISTRATION_ATTEMPTS).increment(1);
}

pub fn lookup(found: bool) {
    let outcome = if found { "hit" } else { "miss" };
    ::metrics::counter!(LOOKUPS, "outcome" => outcome).increment(1);
}

pub fn instance_pruned() {
    ::metrics::counter!(INSTANCES_PRUNED).increment(1);
}

pub fn operation(service: &str, operation: &str, status: u16) {
    ::metrics::counter!(
        OPERATIONS,
        "service" => service.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

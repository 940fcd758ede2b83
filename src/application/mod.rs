// Workload simulation
pub mod samplers;

// Job lifecycles: continuous loops, one-shot runs, both at once
pub mod scheduler;

// System orchestrator
pub mod system;

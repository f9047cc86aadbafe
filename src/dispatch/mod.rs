//! Dispatch scheduler: jobs, technicians, the priority queue, matching,
//! and the service that ties them together.

pub mod dispatcher;
pub mod job;
pub mod matcher;
pub mod queue;
pub mod registry;
pub mod report;
pub mod technician;

pub use dispatcher::{
    Assignment, Completion, DispatchBoard, DispatchEvent, Dispatcher, PassReport, PassStop,
    spawn_dispatch_loop,
};
pub use job::{CustomerInfo, Job, JobId, JobStatus, PriorityTier, StatusTransition};
pub use matcher::{MatchChoice, MatchPolicy, Matcher};
pub use queue::{PriorityQueue, QueueEntry};
pub use registry::{JobRegistry, TechnicianRegistry};
pub use report::{DispatchSummary, JobReport};
pub use technician::{Technician, TechnicianId};

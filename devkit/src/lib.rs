/*!
# nodehealth DevKit - test doubles for the node-health agent

Lets the agent's decision logic run without OS privileges or real time:
- Recording outbound queue standing in for the networking layer
- Scripted CPU-time source, recording terminator, virtual sleeper
- Counting rebooter and fixed uptime for remediation tests
- Harness driving a stall watcher end to end
*/

pub mod fakes;
pub mod queue_stub;
pub mod test_utils;

pub use fakes::{CountingRebooter, FixedUptime, RecordingTerminator, ScriptedCpuTimes, StaticHost, VirtualSleeper};
pub use queue_stub::MockQueue;
pub use test_utils::{WatchReport, WatcherHarness};

/*!
# WaWaDo DevKit - test doubles for the kernel

Lets kernel behaviour be exercised without a broker, a chat bridge or a
reachable network:
- scripted reachability probe
- recording alert sink
- builders for bus payloads
- a harness owning temporary host and client files
*/

pub mod payloads;
pub mod probe_stub;
pub mod sink_stub;
pub mod test_utils;

pub use payloads::PayloadBuilder;
pub use probe_stub::ScriptedProbe;
pub use sink_stub::RecordingSink;
pub use test_utils::TestHarness;

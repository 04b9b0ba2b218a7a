// ─── Racing+ Client Core ───
// Child processes spawned by the Racing+ desktop client.
//
// Architecture:
//   core/
//     ipc/         Line protocol with the parent (stdin / stdout)
//     settings     JSON settings with built-in defaults
//     integrity/   Checksum manifest + mod directory verification
//     platform/    Steam registry lookups + localconfig.vdf launch options
//     process/     Process listing, lookup and termination
//     sandbox/     Lua sandbox files in the game directory
//     checks/      Startup check state machine
//     relay/       TCP fan-out + UDP proxy between the game and the parent

pub mod checks;
pub mod error;
pub mod http;
pub mod integrity;
pub mod ipc;
pub mod platform;
pub mod process;
pub mod relay;
pub mod sandbox;
pub mod settings;

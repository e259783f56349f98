// ─── Molten Core ───
// Modular backend architecture for the mod manager.
//
// Architecture:
//   core/
//     instance/   - Instance model + CRUD manager
//     mods/       - Sync, enrichment, verification, deps, updates
//     registry/   - Modrinth + CurseForge API clients
//     downloader  - Concurrent downloads with SHA-1 validation
//     watcher/    - Mods folder filesystem watcher
//     events      - Event payloads emitted to the frontend
//     state/      - Global application state

pub mod downloader;
pub mod error;
pub mod events;
pub mod http;
pub mod instance;
pub mod mods;
pub mod registry;
pub mod state;
pub mod watcher;

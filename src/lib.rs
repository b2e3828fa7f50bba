//! OpenMicroCar arena server
//!
//! Cars and base stations connect over TCP and report infrared sightings as
//! text lines. A single game loop turns those sightings into tags, safe
//! zone changes and flag captures, and sends short hex commands back to the
//! devices. Operators drive cars through a small HTTP control panel.

pub mod app;
pub mod config;
pub mod directory;
pub mod dispatch;
pub mod game;
pub mod http;
pub mod net;
pub mod util;

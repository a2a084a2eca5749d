// Interface adapters layer: protocol translation, sockets, and service clients.

pub mod clients;
pub mod http;
pub mod net;
pub mod protocol;
pub mod state;
pub mod utils;

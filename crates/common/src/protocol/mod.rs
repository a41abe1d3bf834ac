// Wire protocol for the huddle-chat.v1 relay.

pub mod envelope;

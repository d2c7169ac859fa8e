//! Telnet wire constants (RFC 854).
//!
//! Only the bytes the stream demultiplexer needs to recognise. Option
//! negotiation beyond ECHO is consumed structurally and never answered.

// Interpret As Command
pub const IAC: u8 = 255;

// Negotiation commands: offer, refuse, request, accept
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;

// Subnegotiation Begin
pub const SB: u8 = 250;

// Go Ahead, sent by servers to mark the end of a prompt
pub const GA: u8 = 249;

// Subnegotiation End
pub const SE: u8 = 240;

// Echo option
pub const ECHO: u8 = 1;

/// Returns true for the four one-byte negotiation commands.
pub fn is_negotiation(command: u8) -> bool {
    matches!(command, WILL | WONT | DO | DONT)
}

/// Human readable name for a command byte, used in debug logs.
pub fn command_name(command: u8) -> &'static str {
    match command {
        WILL => "WILL",
        WONT => "WONT",
        DO => "DO",
        DONT => "DONT",
        SB => "SB",
        GA => "GA",
        SE => "SE",
        IAC => "IAC",
        _ => "?",
    }
}

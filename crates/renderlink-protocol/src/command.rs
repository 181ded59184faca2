//! The command catalogue.
//!
//! [`CATALOGUE`] is the single source of truth for command codes, their wire
//! names and their replies. Codes are append-only: a code is never reassigned
//! to a different meaning, and `0xFFFF` is reserved for [`CommandCode::Unknown`].

use std::fmt;

/// Identifies one operation on the wire (2 bytes, native byte order).
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandCode {
    Ping = 0,
    ClearScreen = 1,
    Dots = 2,
    Flush = 3,
    SetXform = 4,
    Line = 5,
    Quad = 6,
    CreateTexture = 7,
    BltTexture = 8,
    Test = 9,
    Fullscreen = 10,
    Windowed = 11,
    Blocking = 12,
    Nonblocking = 13,
    ProfileOn = 14,
    ProfileOff = 15,
    Polygon = 16,
    GetSecs = 17,
    /// Error or unknown. Never an assigned code.
    Unknown = u16::MAX,
}

/// What the render server writes back after executing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Nothing (apart from a profiling stamp when profiling is on).
    None,
    /// One 8-byte double.
    Double,
}

/// One catalogue row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub code: CommandCode,
    /// Wire name, as exposed to calling environments.
    pub name: &'static str,
    pub reply: ReplyShape,
    /// The server stops draining commands for the current frame after this one.
    pub ends_frame: bool,
    /// One-line description for diagnostics.
    pub summary: &'static str,
}

const fn entry(
    code: CommandCode,
    name: &'static str,
    reply: ReplyShape,
    ends_frame: bool,
    summary: &'static str,
) -> CommandSpec {
    CommandSpec {
        code,
        name,
        reply,
        ends_frame,
        summary,
    }
}

/// Every assigned command, in stable catalogue order.
pub static CATALOGUE: [CommandSpec; 18] = [
    entry(CommandCode::Ping, "ping", ReplyShape::None, false, "liveness check"),
    entry(
        CommandCode::ClearScreen,
        "clearScreen",
        ReplyShape::None,
        false,
        "set the clear color (rgb)",
    ),
    entry(
        CommandCode::Dots,
        "dots",
        ReplyShape::None,
        false,
        "draw points (size, rgb, shape, xyz vertices)",
    ),
    entry(
        CommandCode::Flush,
        "flush",
        ReplyShape::Double,
        true,
        "present the frame and acknowledge",
    ),
    entry(
        CommandCode::SetXform,
        "setXform",
        ReplyShape::None,
        false,
        "set the 4x4 coordinate transform",
    ),
    entry(CommandCode::Line, "line", ReplyShape::None, false, "draw lines (xyz+rgb vertices)"),
    entry(
        CommandCode::Quad,
        "quad",
        ReplyShape::None,
        false,
        "draw quads as triangles (xyz+rgb vertices)",
    ),
    entry(
        CommandCode::CreateTexture,
        "createTexture",
        ReplyShape::None,
        false,
        "upload an rgba float texture",
    ),
    entry(
        CommandCode::BltTexture,
        "bltTexture",
        ReplyShape::None,
        false,
        "draw the texture (xyz+uv vertices, phase)",
    ),
    entry(CommandCode::Test, "test", ReplyShape::None, false, "renderer self-test"),
    entry(CommandCode::Fullscreen, "fullscreen", ReplyShape::None, true, "switch to fullscreen"),
    entry(CommandCode::Windowed, "windowed", ReplyShape::None, true, "switch to a window"),
    entry(
        CommandCode::Blocking,
        "blocking",
        ReplyShape::None,
        false,
        "wait for commands without servicing events",
    ),
    entry(
        CommandCode::Nonblocking,
        "nonblocking",
        ReplyShape::None,
        false,
        "service events between commands",
    ),
    entry(
        CommandCode::ProfileOn,
        "profileOn",
        ReplyShape::None,
        false,
        "stamp every reply with the server time",
    ),
    entry(CommandCode::ProfileOff, "profileOff", ReplyShape::None, false, "stop profiling stamps"),
    entry(
        CommandCode::Polygon,
        "polygon",
        ReplyShape::None,
        false,
        "draw a triangle strip (xyz+rgb vertices)",
    ),
    entry(CommandCode::GetSecs, "getSecs", ReplyShape::Double, false, "read the server clock"),
];

impl CommandCode {
    /// All assigned codes in catalogue order.
    pub fn all() -> impl ExactSizeIterator<Item = CommandCode> {
        CATALOGUE.iter().map(|spec| spec.code)
    }

    /// Map a raw wire value to a code. Unassigned values become [`CommandCode::Unknown`].
    pub fn from_wire(value: u16) -> CommandCode {
        CATALOGUE
            .iter()
            .find(|spec| spec.code as u16 == value)
            .map_or(CommandCode::Unknown, |spec| spec.code)
    }

    /// Look a code up by its wire name.
    pub fn from_name(name: &str) -> Option<CommandCode> {
        CATALOGUE
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.code)
    }

    /// Raw wire value.
    pub fn to_wire(self) -> u16 {
        self as u16
    }

    /// Catalogue row, `None` for [`CommandCode::Unknown`].
    pub fn spec(self) -> Option<&'static CommandSpec> {
        CATALOGUE.iter().find(|spec| spec.code == self)
    }

    /// Human-readable name for diagnostics.
    pub fn name(self) -> &'static str {
        self.spec().map_or("unknown", |spec| spec.name)
    }

    pub fn reply(self) -> ReplyShape {
        self.spec().map_or(ReplyShape::None, |spec| spec.reply)
    }

    pub fn ends_frame(self) -> bool {
        self.spec().is_some_and(|spec| spec.ends_frame)
    }

    pub fn is_unknown(self) -> bool {
        self == CommandCode::Unknown
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Codes in catalogue order. Index `i` here names index `i` of [`names`].
pub fn codes() -> impl ExactSizeIterator<Item = u16> {
    CATALOGUE.iter().map(|spec| spec.code as u16)
}

/// Names in catalogue order. Index `i` here names index `i` of [`codes`].
pub fn names() -> impl ExactSizeIterator<Item = &'static str> {
    CATALOGUE.iter().map(|spec| spec.name)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn codes_and_names_are_unique() {
        let codes: HashSet<u16> = codes().collect();
        let names: HashSet<&str> = names().collect();
        assert_eq!(codes.len(), CATALOGUE.len());
        assert_eq!(names.len(), CATALOGUE.len());
    }

    #[test]
    fn unknown_is_never_assigned() {
        assert!(CommandCode::all().all(|code| !code.is_unknown()));
        assert!(!codes().any(|code| code == u16::MAX));
        assert!(CommandCode::Unknown.spec().is_none());
        assert_eq!(CommandCode::Unknown.name(), "unknown");
    }

    #[test]
    fn codes_and_names_stay_in_lockstep() {
        for ((code, name), spec) in codes().zip(names()).zip(CATALOGUE.iter()) {
            assert_eq!(CommandCode::from_wire(code).name(), name);
            assert_eq!(CommandCode::from_name(name), Some(spec.code));
        }
    }

    #[test]
    fn wire_values_match_assigned_numbers() {
        assert_eq!(CommandCode::Ping.to_wire(), 0);
        assert_eq!(CommandCode::ClearScreen.to_wire(), 1);
        assert_eq!(CommandCode::SetXform.to_wire(), 4);
        assert_eq!(CommandCode::CreateTexture.to_wire(), 7);
        assert_eq!(CommandCode::Polygon.to_wire(), 16);
        assert_eq!(CommandCode::GetSecs.to_wire(), 17);
        assert_eq!(CommandCode::Unknown.to_wire(), 0xFFFF);
    }

    #[test]
    fn every_unassigned_value_maps_to_unknown() {
        let assigned: HashSet<u16> = codes().collect();
        for value in 0..=u16::MAX {
            let code = CommandCode::from_wire(value);
            if assigned.contains(&value) {
                assert_eq!(code.to_wire(), value);
            } else {
                assert_eq!(code, CommandCode::Unknown, "value {value}");
            }
        }
    }

    #[test]
    fn replies_and_frame_boundaries() {
        assert_eq!(CommandCode::GetSecs.reply(), ReplyShape::Double);
        assert_eq!(CommandCode::Flush.reply(), ReplyShape::Double);
        assert_eq!(CommandCode::SetXform.reply(), ReplyShape::None);
        assert!(CommandCode::Flush.ends_frame());
        assert!(CommandCode::Fullscreen.ends_frame());
        assert!(CommandCode::Windowed.ends_frame());
        assert!(!CommandCode::Dots.ends_frame());
        assert!(!CommandCode::Unknown.ends_frame());
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(CommandCode::BltTexture.to_string(), "bltTexture");
        assert_eq!(CommandCode::from_name("nope"), None);
    }
}

// Built-in Command Shell
//
// A line-editing command loop over the display and input capabilities. It
// is the first consumer of the hardware record after boot: `hwinfo` and
// `tier` print it back, read-only.
//
// Line discipline:
// - Printable ASCII is echoed and appended while the 255-byte line has room
// - Backspace (0x08) and DEL (0x7f) drop the last byte and echo 0x08; the
//   backend decides how to erase the cell
// - CR or LF submits the line; anything else is ignored
//
// Dispatch:
// - `Command::parse` splits on ASCII whitespace, keeping at most 16 words
// - `Shell::execute` runs a parsed command against a `Hal`
//
// Parsing and execution are separate so both can run against a mock `Hal`
// in host tests.

use core::fmt::Write;

use heapless::Vec;

use crate::boot::Banner;
use crate::hal::{ConsoleColor, DisplayWriter, Hal};
use crate::info::HardwareInfo;

pub const LINE_CAPACITY: usize = 255;
pub const MAX_ARGS: usize = 16;

const PROMPT: &str = "lumen";

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

const HELP: &[(&str, &str)] = &[
    ("help", "show this message"),
    ("clear", "clear the screen"),
    ("echo ...", "print arguments"),
    ("version", "show kernel version"),
    ("hwinfo", "show detected hardware"),
    ("tier", "show hardware tier"),
    ("halt", "halt the system"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Empty,
    Help,
    Clear,
    Echo(Vec<&'a str, MAX_ARGS>),
    Version,
    HwInfo,
    Tier,
    Halt,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let mut words = line.split_ascii_whitespace().take(MAX_ARGS);

        let Some(name) = words.next() else {
            return Command::Empty;
        };

        match name {
            "help" => Command::Help,
            "clear" => Command::Clear,
            "echo" => Command::Echo(words.collect()),
            "version" => Command::Version,
            "hwinfo" => Command::HwInfo,
            "tier" => Command::Tier,
            "halt" => Command::Halt,
            other => Command::Unknown(other),
        }
    }
}

pub struct Shell<'a> {
    info: &'a HardwareInfo,
    banner: &'a Banner<'a>,
    line: Vec<u8, LINE_CAPACITY>,
}

impl<'a> Shell<'a> {
    pub fn new(info: &'a HardwareInfo, banner: &'a Banner<'a>) -> Self {
        Self {
            info,
            banner,
            line: Vec::new(),
        }
    }

    pub fn run<H: Hal + ?Sized>(&mut self, hal: &mut H) -> ! {
        log::info!(target: "shell", "entering shell");
        self.prompt(hal);

        loop {
            let byte = hal.input_read_byte();
            self.feed(hal, byte);
        }
    }

    /// Applies one input byte to the line being edited.
    pub fn feed<H: Hal + ?Sized>(&mut self, hal: &mut H, byte: u8) {
        match byte {
            b'\r' | b'\n' => {
                hal.display_write_byte(b'\n');

                let line = self.line.clone();
                self.line.clear();

                let text = core::str::from_utf8(&line).unwrap_or("");
                self.execute(hal, &Command::parse(text));
                self.prompt(hal);
            }
            BACKSPACE | DELETE => {
                if self.line.pop().is_some() {
                    hal.display_write_byte(BACKSPACE);
                }
            }
            0x20..=0x7e => {
                if self.line.push(byte).is_ok() {
                    hal.display_write_byte(byte);
                }
            }
            _ => {}
        }
    }

    pub fn execute<H: Hal + ?Sized>(&self, hal: &mut H, command: &Command<'_>) {
        match command {
            Command::Empty => {}
            Command::Help => self.help(hal),
            Command::Clear => hal.display_clear(),
            Command::Echo(args) => {
                let mut out = DisplayWriter::new(hal);
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        let _ = out.write_char(' ');
                    }
                    let _ = out.write_str(arg);
                }
                let _ = out.write_char('\n');
            }
            Command::Version => {
                hal.display_set_color(ConsoleColor::Cyan, ConsoleColor::Black);
                let _ = writeln!(
                    DisplayWriter::new(hal),
                    "{} v{}",
                    self.banner.name,
                    self.banner.version
                );
                hal.display_set_color(ConsoleColor::LightGray, ConsoleColor::Black);
                hal.display_write_str(self.banner.tagline);
                hal.display_write_str("\n");
            }
            Command::HwInfo => self.hwinfo(hal),
            Command::Tier => {
                let _ = writeln!(DisplayWriter::new(hal), "Tier: {}", self.info.tier());
            }
            Command::Halt => {
                hal.display_set_color(ConsoleColor::LightRed, ConsoleColor::Black);
                hal.display_write_str("System halted.\n");
                log::info!(target: "shell", "halt requested");
                hal.halt();
            }
            Command::Unknown(name) => {
                hal.display_set_color(ConsoleColor::LightRed, ConsoleColor::Black);
                let _ = writeln!(DisplayWriter::new(hal), "Unknown command: {}", name);
                hal.display_set_color(ConsoleColor::LightGray, ConsoleColor::Black);
            }
        }
    }

    fn prompt<H: Hal + ?Sized>(&self, hal: &mut H) {
        hal.display_set_color(ConsoleColor::LightGreen, ConsoleColor::Black);
        hal.display_write_str(PROMPT);
        hal.display_set_color(ConsoleColor::White, ConsoleColor::Black);
        hal.display_write_str("> ");
        hal.display_set_color(ConsoleColor::LightGray, ConsoleColor::Black);
    }

    fn help<H: Hal + ?Sized>(&self, hal: &mut H) {
        hal.display_set_color(ConsoleColor::Yellow, ConsoleColor::Black);
        hal.display_write_str("Built-in commands:\n");
        hal.display_set_color(ConsoleColor::LightGray, ConsoleColor::Black);

        let mut out = DisplayWriter::new(hal);
        for (name, summary) in HELP {
            let _ = writeln!(out, "  {:<9} - {}", name, summary);
        }
    }

    fn hwinfo<H: Hal + ?Sized>(&self, hal: &mut H) {
        let info = self.info;
        let mut out = DisplayWriter::new(hal);

        let _ = writeln!(out, "arch:       {}", info.arch());
        let _ = writeln!(out, "model:      {}", or_unknown(info.model()));
        let _ = writeln!(out, "cpu cores:  {}", info.cpu_cores());
        let _ = writeln!(out, "ram:        {} MiB", info.ram_mib());
        let _ = writeln!(out, "compat:     {}", or_unknown(info.compat()));
        let _ = write_base(&mut out, "uart base:  ", info.uart_base());
        let _ = write_base(&mut out, "gic dist:   ", info.intc_dist_base());
        let _ = write_base(&mut out, "gic cpu:    ", info.intc_cpu_base());
        let _ = writeln!(out, "tier:       {}", info.tier());
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn write_base<W: Write>(out: &mut W, label: &str, base: u64) -> core::fmt::Result {
    if base == 0 {
        writeln!(out, "{}none", label)
    } else {
        writeln!(out, "{}{:#x}", label, base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fdt::RawDescriptor;
    use crate::hal::mock::MockHal;
    use crate::info::{Arch, ModelString, MIB};
    use crate::x86::X86Detection;

    const BANNER: Banner<'static> = Banner {
        name: "Lumen",
        tagline: "Hardware-aware kernel",
        version: "0.1.0",
    };

    fn pc() -> HardwareInfo {
        let mut brand = ModelString::new();
        brand.push_str("QEMU Virtual CPU").unwrap();
        HardwareInfo::from_x86(X86Detection {
            cores: 2,
            ram_bytes: 512 * MIB,
            brand,
        })
    }

    fn type_line(shell: &mut Shell<'_>, hal: &mut MockHal, text: &str) {
        for byte in text.bytes() {
            shell.feed(hal, byte);
        }
    }

    #[test]
    fn parse_splits_and_caps_arguments() {
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("   \t "), Command::Empty);
        assert_eq!(Command::parse("tier"), Command::Tier);
        assert_eq!(Command::parse("  halt  "), Command::Halt);
        assert_eq!(Command::parse("reboot now"), Command::Unknown("reboot"));

        let Command::Echo(args) = Command::parse("echo  a b   c") else {
            panic!("expected echo");
        };
        assert_eq!(args.as_slice(), ["a", "b", "c"]);

        let many = "echo 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18";
        let Command::Echo(args) = Command::parse(many) else {
            panic!("expected echo");
        };
        assert_eq!(args.len(), MAX_ARGS - 1);
        assert_eq!(args.last(), Some(&"15"));
    }

    #[test]
    fn echo_joins_arguments() {
        let info = pc();
        let mut hal = MockHal::blank();
        let mut shell = Shell::new(&info, &BANNER);

        type_line(&mut shell, &mut hal, "echo hello   world\n");
        assert!(hal.display.starts_with("echo hello   world\nhello world\nlumen> "));
    }

    #[test]
    fn tier_prints_record_tier() {
        let info = pc();
        let mut hal = MockHal::blank();
        let shell = Shell::new(&info, &BANNER);

        shell.execute(&mut hal, &Command::Tier);
        assert_eq!(hal.display, "Tier: MID\n");
    }

    #[test]
    fn unknown_command_is_reported() {
        let info = pc();
        let mut hal = MockHal::blank();
        let shell = Shell::new(&info, &BANNER);

        shell.execute(&mut hal, &Command::parse("frobnicate --now"));
        assert_eq!(hal.display, "Unknown command: frobnicate\n");
        assert_eq!(hal.colors.first(), Some(&(ConsoleColor::LightRed, ConsoleColor::Black)));
    }

    #[test]
    fn backspace_edits_line() {
        let info = pc();
        let mut hal = MockHal::blank();
        let mut shell = Shell::new(&info, &BANNER);

        type_line(&mut shell, &mut hal, "tiex");
        shell.feed(&mut hal, DELETE);
        type_line(&mut shell, &mut hal, "r\r");
        assert!(hal.display.ends_with("tier\nTier: MID\nlumen> "));

        // Nothing to erase on an empty line.
        let before = hal.display.clone();
        shell.feed(&mut hal, BACKSPACE);
        assert_eq!(hal.display, before);
    }

    #[test]
    fn line_stops_growing_at_capacity() {
        let info = pc();
        let mut hal = MockHal::blank();
        let mut shell = Shell::new(&info, &BANNER);

        for _ in 0..LINE_CAPACITY + 10 {
            shell.feed(&mut hal, b'x');
        }
        assert_eq!(shell.line.len(), LINE_CAPACITY);
        assert_eq!(hal.display.len(), LINE_CAPACITY);
    }

    #[test]
    fn hwinfo_lists_every_field() {
        let mut raw = RawDescriptor::default();
        raw.cpu_count = 4;
        raw.ram_size = 1024 * MIB;
        raw.uart_base = 0xFE20_1000;
        raw.uart_compat.push_str("arm,pl011").unwrap();
        let info = HardwareInfo::from_device_tree(&raw, ModelString::new());

        let mut hal = MockHal::blank();
        Shell::new(&info, &BANNER).execute(&mut hal, &Command::HwInfo);

        assert!(hal.display.contains("arch:       arm64\n"));
        assert!(hal.display.contains("model:      -\n"));
        assert!(hal.display.contains("ram:        1024 MiB\n"));
        assert!(hal.display.contains("compat:     arm,pl011\n"));
        assert!(hal.display.contains("uart base:  0xfe201000\n"));
        assert!(hal.display.contains("gic dist:   none\n"));
        assert!(hal.display.contains("tier:       MID\n"));
        assert_eq!(info.arch(), Arch::Arm64);
    }

    #[test]
    fn version_uses_banner() {
        let info = pc();
        let mut hal = MockHal::blank();
        Shell::new(&info, &BANNER).execute(&mut hal, &Command::Version);
        assert_eq!(hal.display, "Lumen v0.1.0\nHardware-aware kernel\n");
    }

    #[test]
    fn clear_reaches_display() {
        let info = pc();
        let mut hal = MockHal::blank();
        type_line(&mut Shell::new(&info, &BANNER), &mut hal, "clear\n");
        assert!(hal.calls.contains(&"display_clear"));
        assert_eq!(hal.display, "lumen> ");
    }
}

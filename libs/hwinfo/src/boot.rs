// Portable Boot Sequence
//
// Brings the machine up through the `Hal` capabilities in a fixed order and
// hands the detected `HardwareInfo` back to the caller, which owns it for
// the rest of boot.
//
// Ordering:
// 1. Hardware detection, while only this context exists
// 2. Serial, which may need the UART base from step 1
// 3. CPU tables (GDT/IDT or vector base)
// 4. Interrupt controller, which may need the GIC bases from step 1
// 5. Display
// 6. Input
//
// Detection must come first: every later step may depend on the record, and
// running it before the interrupt controller exists is what makes the record
// safe to share read-only afterwards.

use core::fmt::Write;

use log::info;

use crate::hal::{ConsoleColor, DisplayWriter, Hal};
use crate::info::HardwareInfo;

const LOG_TARGET: &str = "boot";

const RULE: &str =
    "================================================================================";

const SCREEN_WIDTH: usize = 80;

fn centered<W: Write>(out: &mut W, label: &str, text: &str) -> core::fmt::Result {
    let indent = SCREEN_WIDTH.saturating_sub(label.len() + text.len()) / 2;
    writeln!(out, "{:indent$}{}{}", "", label, text, indent = indent)
}

/// Product identity printed under the hardware line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Banner<'a> {
    pub name: &'a str,
    pub tagline: &'a str,
    pub version: &'a str,
}

pub fn bring_up<H: Hal + ?Sized>(hal: &mut H) -> HardwareInfo {
    let info = hal.detect_hardware();

    hal.serial_init(&info);
    info!(target: LOG_TARGET, "serial ready");
    info!(target: LOG_TARGET, "hardware: {}", info);

    hal.cpu_init();
    info!(target: LOG_TARGET, "cpu tables loaded");

    hal.intc_init(&info);
    info!(target: LOG_TARGET, "interrupt controller ready");

    hal.display_init();
    info!(target: LOG_TARGET, "display ready");

    hal.input_init();
    info!(target: LOG_TARGET, "input ready");

    info
}

/// Prints the one-line hardware summary followed by the product banner.
pub fn write_banner<H: Hal + ?Sized>(hal: &mut H, info: &HardwareInfo, banner: &Banner<'_>) {
    let model = if info.model().is_empty() { "unknown" } else { info.model() };

    hal.display_set_color(ConsoleColor::Yellow, ConsoleColor::Black);
    hal.display_write_str("[hal] CPU: ");
    hal.display_set_color(ConsoleColor::LightGray, ConsoleColor::Black);
    hal.display_write_str(model);
    hal.display_write_str("  Tier: ");
    hal.display_write_str(info.tier().as_str());
    hal.display_write_str("\n");

    hal.display_set_color(ConsoleColor::Cyan, ConsoleColor::Black);
    hal.display_write_str(RULE);
    hal.display_set_color(ConsoleColor::White, ConsoleColor::Black);
    hal.display_write_str("\n\n");

    let mut out = DisplayWriter::new(hal);
    let _ = centered(&mut out, "", banner.name);
    let _ = centered(&mut out, "", banner.tagline);
    let _ = centered(&mut out, "Version ", banner.version);
    let _ = writeln!(out);

    hal.display_set_color(ConsoleColor::Cyan, ConsoleColor::Black);
    hal.display_write_str(RULE);
    hal.display_set_color(ConsoleColor::LightGray, ConsoleColor::Black);
    hal.display_write_str("\n\nType 'help' for a list of commands.\n\n");
}

//! UC1628 LCD controller driver.
//!
//! The panel is brought up by a routine the host platform provides, see [`LcdController`]. This
//! driver supplies what that routine needs: the UC1628 register tables, the panel geometry and
//! the bus timing, and it checks frames before they are blitted.
//!
//! Example:
//!
//!     # use peripheral_drivers::uc1628::{LcdController, PanelConfig, Uc1628, Window};
//!     # struct Host;
//!     # impl LcdController for Host {
//!     #     type Error = ();
//!     #     fn lcd_init(&mut self, _: &PanelConfig, _: &[u8], _: &[u8]) -> Result<(), ()> { Ok(()) }
//!     #     fn lcd_write(&mut self, _: &[u8], _: Window) -> Result<(), ()> { Ok(()) }
//!     # }
//!     # let host = Host;
//!     // No custom table: the built-in UC1628 init sequence is used.
//!     let mut lcd = Uc1628::initialize(host, None, 128, 160, 13_000).unwrap();
//!
//!     // One byte per column for each 8 pixel high page, 128 columns by 20 pages.
//!     let frame = [0u8; 128 * 20];
//!     lcd.write(&frame, 0, 0, 127, 19).unwrap();

use core::slice::ChunksExact;

use crate::Error;

/// Default UC1628 bring-up table for a 128x160 panel.
///
/// `(control type, parameter count, value)` triples, see [`InitStep`].
#[rustfmt::skip]
pub const INIT_SEQUENCE: &[u8] = &[
    2, 0, 0x78,
    0, 1, 0x04,
    1, 1, 0x00,
    0, 0, 0x10,
    0, 0, 0x13,
    0, 0, 0x15,
    0, 0, 0x20,
    0, 0, 0x2D,
    0, 1, 0x40,
    1, 1, 0x00,
    0, 1, 0x60,
    1, 1, 0x00,
    0, 2, 0x81,
    1, 1, 0x00,
    1, 1, 0x98,
    0, 0, 0x86,
    0, 0, 0x89,
    0, 0, 0xC7,
    0, 0, 0xEB,
    0, 1, 0xF1,
    1, 1, 0xA0,
    0, 2, 0xC8,
    1, 1, 0x00,
    1, 1, 0x00,
    0, 1, 0xC9,
    1, 1, 0xAD,
    0, 2, 0x17,
    1, 1, 0x01,
    1, 1, 0x0F,
    0, 2, 0x17,
    1, 1, 0x02,
    1, 1, 0x1E,
    0, 2, 0x17,
    1, 1, 0x03,
    1, 1, 0x28,
    0, 2, 0x17,
    1, 1, 0x04,
    1, 1, 0x32,
    0, 2, 0x17,
    1, 1, 0x05,
    1, 1, 0x3C,
    0, 2, 0x17,
    1, 1, 0x06,
    1, 1, 0x55,
    0, 2, 0x17,
    1, 1, 0x07,
    1, 1, 0x6E,
    0, 2, 0x17,
    1, 1, 0x08,
    1, 1, 0x82,
    0, 2, 0x17,
    1, 1, 0x09,
    1, 1, 0x91,
    0, 2, 0x16,
    1, 1, 0x01,
    1, 1, 0x00,
    0, 2, 0x16,
    1, 1, 0x02,
    1, 1, 0x00,
    0, 2, 0x16,
    1, 1, 0x03,
    1, 1, 0x00,
    0, 2, 0x16,
    1, 1, 0x04,
    1, 1, 0x04,
    0, 2, 0x16,
    1, 1, 0x05,
    1, 1, 0x06,
    0, 2, 0x16,
    1, 1, 0x06,
    1, 1, 0x0D,
    0, 2, 0x16,
    1, 1, 0x07,
    1, 1, 0x0E,
    0, 2, 0x16,
    1, 1, 0x08,
    1, 1, 0x0F,
    0, 2, 0x16,
    1, 1, 0x09,
    1, 1, 0x14,
    0, 2, 0x81,
    1, 1, 0x01,
    1, 1, 0x31,
    0, 2, 0x81,
    1, 1, 0x02,
    1, 1, 0x2C,
    0, 2, 0x81,
    1, 1, 0x03,
    1, 1, 0x27,
    0, 2, 0x81,
    1, 1, 0x04,
    1, 1, 0x22,
    0, 2, 0x81,
    1, 1, 0x05,
    1, 1, 0x1D,
    0, 2, 0x81,
    1, 1, 0x06,
    1, 1, 0x18,
    0, 2, 0x81,
    1, 1, 0x07,
    1, 1, 0x14,
    0, 2, 0x81,
    1, 1, 0x08,
    1, 1, 0x0F,
    0, 2, 0x81,
    1, 1, 0x09,
    1, 1, 0x0A,
    2, 0, 0x0A,
];

/// Table the controller replays to invalidate (prepare for writing) display memory.
#[rustfmt::skip]
pub const INVALIDATE_SEQUENCE: &[u8] = &[
    0, 1, 0x40,
    1, 1, 0xA1,
    0, 1, 0x60,
    1, 1, 0x00,
    0, 1, 0x04,
    1, 1, 0x80,
    0, 0, 0x01,
];

/// First byte of every init table triple.
pub enum ControlType {
    Command = 0,
    Data = 1,
    Delay = 2,
}

/// One decoded triple of an init table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub enum InitStep {
    /// Send `opcode`. The next `params` steps are its data bytes.
    Command { opcode: u8, params: u8 },
    /// A parameter byte for the preceding command.
    Data(u8),
    /// Wait this many milliseconds.
    DelayMs(u8),
}

impl InitStep {
    /// Decode one triple. `None` for a control type this controller does not know, or a
    /// parameter count that does not fit the control type.
    pub fn from_triple(triple: [u8; 3]) -> Option<Self> {
        let [control, count, value] = triple;
        match control {
            c if c == ControlType::Command as u8 => Some(InitStep::Command {
                opcode: value,
                params: count,
            }),
            c if c == ControlType::Data as u8 && count == 1 => Some(InitStep::Data(value)),
            c if c == ControlType::Delay as u8 && count == 0 => Some(InitStep::DelayMs(value)),
            _ => None,
        }
    }
}

/// Iterator over the steps of an init table, see [`steps`].
pub struct InitSteps<'a> {
    triples: ChunksExact<'a, u8>,
}

impl Iterator for InitSteps<'_> {
    type Item = Option<InitStep>;

    fn next(&mut self) -> Option<Self::Item> {
        self.triples
            .next()
            .map(|t| InitStep::from_triple([t[0], t[1], t[2]]))
    }
}

/// Walk an init table triple by triple. Undecodable triples come out as `None`, and trailing
/// bytes that do not make up a full triple are ignored.
pub fn steps(sequence: &[u8]) -> InitSteps<'_> {
    InitSteps {
        triples: sequence.chunks_exact(3),
    }
}

/// Check that `sequence` is a well formed init table.
///
/// Every triple must decode, the table must not end in a partial triple, and each command must
/// be followed by exactly as many data steps as it announces.
pub fn validate_sequence<E>(sequence: &[u8]) -> Result<(), Error<E>> {
    if sequence.is_empty() || sequence.len() % 3 != 0 {
        return Err(Error::InvalidInitSequence);
    }

    let mut pending_params: u8 = 0;
    for step in steps(sequence) {
        match step.ok_or(Error::InvalidInitSequence)? {
            InitStep::Command { params, .. } if pending_params == 0 => pending_params = params,
            InitStep::Data(_) if pending_params > 0 => pending_params -= 1,
            InitStep::DelayMs(_) if pending_params == 0 => (),
            _ => return Err(Error::InvalidInitSequence),
        }
    }

    if pending_params != 0 {
        return Err(Error::InvalidInitSequence);
    }
    Ok(())
}

/// Bus timing handed to the bring-up routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct BusTiming {
    /// Data lines used by the panel interface.
    pub data_lines: u8,
    /// Wires of the serial interface.
    pub line_count: u8,
    /// Panel type code of the bring-up routine.
    pub panel_type: u8,
}

impl BusTiming {
    /// Single data line, 4-wire serial, as the UC1628 module is wired.
    pub const UC1628: Self = BusTiming {
        data_lines: 1,
        line_count: 4,
        panel_type: 1,
    };
}

/// Geometry and timing of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct PanelConfig {
    pub width: u16,
    pub height: u16,
    /// Interface clock in kHz.
    pub clock_khz: u32,
    pub timing: BusTiming,
}

/// A rectangle of display memory, corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "use-defmt", derive(defmt::Format))]
pub struct Window {
    pub x0: u16,
    pub y0: u16,
    pub x1: u16,
    pub y1: u16,
}

impl Window {
    /// Number of bytes a frame for this window holds. One byte per column per page.
    ///
    /// Saturates at `usize::MAX` where the product does not fit, a length no slice can have.
    pub fn frame_len(&self) -> usize {
        let columns = u64::from(self.x1.saturating_sub(self.x0)) + 1;
        let pages = u64::from(self.y1.saturating_sub(self.y0)) + 1;
        usize::try_from(columns * pages).unwrap_or(usize::MAX)
    }
}

/// The host's LCD bring-up primitive.
///
/// Implement this on top of the platform's display peripheral. The driver calls `lcd_init` once
/// and `lcd_write` for every frame.
pub trait LcdController {
    type Error;

    /// Configure the interface for `config`, replay `init` into the controller, and keep
    /// `invalidate` for use before memory writes.
    fn lcd_init(
        &mut self,
        config: &PanelConfig,
        init: &[u8],
        invalidate: &[u8],
    ) -> Result<(), Self::Error>;

    /// Copy `frame` into `window` of display memory.
    fn lcd_write(&mut self, frame: &[u8], window: Window) -> Result<(), Self::Error>;
}

/// A UC1628 panel behind the controller `L`.
pub struct Uc1628<L> {
    controller: L,
    config: PanelConfig,
}

impl<E, L> Uc1628<L>
where
    L: LcdController<Error = E>,
{
    /// Bring the panel up.
    ///
    /// `init_sequence` replaces the built-in [`INIT_SEQUENCE`] and is validated first. The
    /// invalidate table is always [`INVALIDATE_SEQUENCE`].
    pub fn initialize(
        mut controller: L,
        init_sequence: Option<&[u8]>,
        width: u16,
        height: u16,
        clock_khz: u32,
    ) -> Result<Self, Error<E>> {
        let init = match init_sequence {
            Some(custom) => {
                validate_sequence(custom)?;
                custom
            }
            None => INIT_SEQUENCE,
        };

        let config = PanelConfig {
            width,
            height,
            clock_khz,
            timing: BusTiming::UC1628,
        };
        controller
            .lcd_init(&config, init, INVALIDATE_SEQUENCE)
            .map_err(Error::Controller)?;

        #[cfg(feature = "use-defmt")]
        defmt::debug!("UC1628 initialized, {=u16}x{=u16} at {=u32} kHz", width, height, clock_khz);

        Ok(Uc1628 { controller, config })
    }

    /// The geometry and timing the panel was brought up with.
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Blit `frame` into the window from `(x0, y0)` to `(x1, y1)`, both corners inclusive.
    ///
    /// `y` counts 8 pixel pages. `frame` must hold exactly one byte per column per page of the
    /// window.
    pub fn write(&mut self, frame: &[u8], x0: u16, y0: u16, x1: u16, y1: u16) -> Result<(), Error<E>> {
        if x0 > x1 || y0 > y1 {
            return Err(Error::InvalidWindow);
        }

        let window = Window { x0, y0, x1, y1 };
        let expected = window.frame_len();
        if frame.len() != expected {
            return Err(Error::FrameLength {
                expected,
                actual: frame.len(),
            });
        }

        self.controller
            .lcd_write(frame, window)
            .map_err(Error::Controller)
    }

    /// Destroys this driver and releases the controller `L`.
    pub fn destroy(self) -> L {
        self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::{
        steps, validate_sequence, BusTiming, InitStep, LcdController, PanelConfig, Uc1628, Window,
        INIT_SEQUENCE, INVALIDATE_SEQUENCE,
    };
    use crate::Error;

    #[derive(Debug, PartialEq)]
    struct Refused;

    /// Records what the driver asks of the bring-up routine.
    #[derive(Default)]
    struct RecordingLcd {
        fail: bool,
        inits: Vec<(PanelConfig, Vec<u8>, Vec<u8>)>,
        writes: Vec<(Vec<u8>, Window)>,
    }

    impl LcdController for RecordingLcd {
        type Error = Refused;

        fn lcd_init(
            &mut self,
            config: &PanelConfig,
            init: &[u8],
            invalidate: &[u8],
        ) -> Result<(), Refused> {
            if self.fail {
                return Err(Refused);
            }
            self.inits.push((*config, init.to_vec(), invalidate.to_vec()));
            Ok(())
        }

        fn lcd_write(&mut self, frame: &[u8], window: Window) -> Result<(), Refused> {
            if self.fail {
                return Err(Refused);
            }
            self.writes.push((frame.to_vec(), window));
            Ok(())
        }
    }

    /// The built-in tables reach the controller unchanged, with the panel geometry.
    #[test]
    fn initialize_with_default_tables() {
        let lcd = Uc1628::initialize(RecordingLcd::default(), None, 163, 256, 13_000).unwrap();
        assert_eq!(lcd.config().timing, BusTiming::UC1628);
        let host = lcd.destroy();

        assert_eq!(host.inits.len(), 1);
        let (config, init, invalidate) = &host.inits[0];
        assert_eq!(
            *config,
            PanelConfig {
                width: 163,
                height: 256,
                clock_khz: 13_000,
                timing: BusTiming::UC1628,
            }
        );
        assert_eq!(init.as_slice(), INIT_SEQUENCE);
        assert_eq!(invalidate.as_slice(), INVALIDATE_SEQUENCE);
    }

    /// Spot checks on the vendor tables.
    #[test]
    fn default_tables() {
        assert_eq!(INIT_SEQUENCE.len(), 108 * 3);
        // 120ms power-on wait first, 10ms wait last.
        assert_eq!(&INIT_SEQUENCE[..3], &[2, 0, 120]);
        assert_eq!(&INIT_SEQUENCE[INIT_SEQUENCE.len() - 3..], &[2, 0, 10]);
        assert_eq!(
            INVALIDATE_SEQUENCE,
            &[0, 1, 0x40, 1, 1, 161, 0, 1, 0x60, 1, 1, 0, 0, 1, 0x04, 1, 1, 128, 0, 0, 0x01]
        );
        assert_eq!(validate_sequence::<()>(INIT_SEQUENCE), Ok(()));
        assert_eq!(validate_sequence::<()>(INVALIDATE_SEQUENCE), Ok(()));
    }

    /// Triples decode into commands, data and delays.
    #[test]
    fn init_steps() {
        let mut iter = steps(INIT_SEQUENCE);
        assert_eq!(iter.next(), Some(Some(InitStep::DelayMs(120))));
        assert_eq!(
            iter.next(),
            Some(Some(InitStep::Command {
                opcode: 0x04,
                params: 1
            }))
        );
        assert_eq!(iter.next(), Some(Some(InitStep::Data(0x00))));

        assert_eq!(InitStep::from_triple([3, 0, 0]), None);
        assert_eq!(InitStep::from_triple([1, 2, 0]), None);
        assert_eq!(InitStep::from_triple([2, 1, 5]), None);
    }

    /// A custom table replaces the default one.
    #[test]
    fn initialize_with_custom_table() {
        let custom: [u8; 9] = [0, 1, 0xE2, 1, 1, 0x00, 2, 0, 5];
        let lcd = Uc1628::initialize(RecordingLcd::default(), Some(&custom[..]), 128, 160, 13_000)
            .unwrap();
        let host = lcd.destroy();

        let (_, init, invalidate) = &host.inits[0];
        assert_eq!(init.as_slice(), &custom);
        assert_eq!(invalidate.as_slice(), INVALIDATE_SEQUENCE);
    }

    /// Malformed custom tables never reach the controller.
    #[test]
    fn initialize_rejects_malformed_table() {
        let malformed: [&[u8]; 5] = [
            &[],
            &[0, 0],                   // partial triple
            &[7, 0, 0x10],             // unknown control type
            &[0, 2, 0x81, 1, 1, 0x00], // command missing a parameter
            &[1, 1, 0x00],             // data without a command
        ];

        for table in malformed {
            let result = Uc1628::initialize(RecordingLcd::default(), Some(table), 128, 160, 13_000);
            match result {
                Ok(_) => panic!("table {:?} should have been rejected", table),
                Err(err) => assert_eq!(err, Error::InvalidInitSequence),
            }
        }
    }

    /// A failing bring-up routine is reported as a controller error.
    #[test]
    fn initialize_controller_failure() {
        let host = RecordingLcd {
            fail: true,
            ..RecordingLcd::default()
        };
        match Uc1628::initialize(host, None, 128, 160, 13_000) {
            Ok(_) => panic!("initialize should report the controller failure"),
            Err(err) => assert_eq!(err, Error::Controller(Refused)),
        }
    }

    /// A 128 column by 20 page frame fills the window (0, 0) to (127, 19).
    #[test]
    fn write_full_window() {
        let mut lcd = Uc1628::initialize(RecordingLcd::default(), None, 128, 160, 13_000).unwrap();
        let frame = vec![0xA5; 128 * 20];
        lcd.write(&frame, 0, 0, 127, 19).unwrap();

        let host = lcd.destroy();
        assert_eq!(host.writes.len(), 1);
        assert_eq!(host.writes[0].0, frame);
        assert_eq!(
            host.writes[0].1,
            Window {
                x0: 0,
                y0: 0,
                x1: 127,
                y1: 19
            }
        );
    }

    /// A single byte window.
    #[test]
    fn write_single_byte() {
        let mut lcd = Uc1628::initialize(RecordingLcd::default(), None, 128, 160, 13_000).unwrap();
        lcd.write(&[0xFF], 5, 7, 5, 7).unwrap();
        assert_eq!(lcd.destroy().writes.len(), 1);
    }

    /// Frames that do not match the window are refused before reaching the controller.
    #[test]
    fn write_frame_length_mismatch() {
        let mut lcd = Uc1628::initialize(RecordingLcd::default(), None, 128, 160, 13_000).unwrap();
        let frame = [0u8; 100];
        assert_eq!(
            lcd.write(&frame, 0, 0, 127, 19),
            Err(Error::FrameLength {
                expected: 2560,
                actual: 100
            })
        );
        assert!(lcd.destroy().writes.is_empty());
    }

    /// The largest window's length does not wrap, and a short frame for it is refused.
    #[test]
    fn write_largest_window() {
        let window = Window {
            x0: 0,
            y0: 0,
            x1: u16::MAX,
            y1: u16::MAX,
        };
        let expected = usize::try_from(1_u64 << 32).unwrap_or(usize::MAX);
        assert_eq!(window.frame_len(), expected);

        let mut lcd = Uc1628::initialize(RecordingLcd::default(), None, 128, 160, 13_000).unwrap();
        assert_eq!(
            lcd.write(&[0], 0, 0, u16::MAX, u16::MAX),
            Err(Error::FrameLength {
                expected,
                actual: 1
            })
        );
        assert!(lcd.destroy().writes.is_empty());
    }

    /// Inverted windows are refused.
    #[test]
    fn write_inverted_window() {
        let mut lcd = Uc1628::initialize(RecordingLcd::default(), None, 128, 160, 13_000).unwrap();
        assert_eq!(lcd.write(&[0], 10, 0, 9, 0), Err(Error::InvalidWindow));
        assert_eq!(lcd.write(&[0], 0, 3, 0, 2), Err(Error::InvalidWindow));
        assert!(lcd.destroy().writes.is_empty());
    }
}

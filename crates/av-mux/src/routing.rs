//! Virtual to physical routing translation
//!
//! Clients think in virtual outputs (stream encoders, TVs, LCDs, CRTs) and
//! virtual inputs (consoles on HDMI, component or SCART). Physically there
//! are two 8x8 matrices:
//!
//! ```text
//!  SCART/COMP sources ──► component matrix ──► OSSC_1..4 ──► HDMI matrix ──► STREAM_1..4
//!                                         └──► CRT_1..4        ▲       └──► LCD_1..4
//!  HDMI sources ──────────────────────────────────────────────-┘
//! ```
//!
//! A `TV_n` output is one physical display fed by both `LCD_n` (HDMI path)
//! and `CRT_n` (component path).
//!
//! Every conversion between index spaces goes through an explicit match
//! table; there is no offset arithmetic between the enums.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// -----------------------------------------------------------------------------
// Virtual I/O
// -----------------------------------------------------------------------------

/// Logical destinations exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VirtualOutput {
    Stream1,
    Stream2,
    Stream3,
    Stream4,
    Tv1,
    Tv2,
    Tv3,
    Tv4,
    Lcd1,
    Lcd2,
    Lcd3,
    Lcd4,
    Crt1,
    Crt2,
    Crt3,
    Crt4,
}

impl VirtualOutput {
    pub const ALL: [VirtualOutput; 16] = [
        VirtualOutput::Stream1,
        VirtualOutput::Stream2,
        VirtualOutput::Stream3,
        VirtualOutput::Stream4,
        VirtualOutput::Tv1,
        VirtualOutput::Tv2,
        VirtualOutput::Tv3,
        VirtualOutput::Tv4,
        VirtualOutput::Lcd1,
        VirtualOutput::Lcd2,
        VirtualOutput::Lcd3,
        VirtualOutput::Lcd4,
        VirtualOutput::Crt1,
        VirtualOutput::Crt2,
        VirtualOutput::Crt3,
        VirtualOutput::Crt4,
    ];

    /// Position in the virtual route vector
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Whether this output has a component-side CRT
    pub fn has_crt(self) -> bool {
        virtual_output_to_crt(self).is_some()
    }
}

/// Logical sources exposed to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VirtualInput {
    Hdmi1,
    Hdmi2,
    Hdmi3,
    Hdmi4,
    Comp1,
    Comp2,
    Comp3,
    Comp4,
    Scart1,
    Scart2,
    Scart3,
    Scart4,
}

impl VirtualInput {
    pub const ALL: [VirtualInput; 12] = [
        VirtualInput::Hdmi1,
        VirtualInput::Hdmi2,
        VirtualInput::Hdmi3,
        VirtualInput::Hdmi4,
        VirtualInput::Comp1,
        VirtualInput::Comp2,
        VirtualInput::Comp3,
        VirtualInput::Comp4,
        VirtualInput::Scart1,
        VirtualInput::Scart2,
        VirtualInput::Scart3,
        VirtualInput::Scart4,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn is_hdmi(self) -> bool {
        matches!(virtual_input_path(self), InputPath::Hdmi(_))
    }
}

// -----------------------------------------------------------------------------
// Physical I/O
// -----------------------------------------------------------------------------

/// HDMI matrix outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HdmiOutput {
    Stream1,
    Stream2,
    Stream3,
    Stream4,
    Lcd1,
    Lcd2,
    Lcd3,
    Lcd4,
}

/// HDMI matrix inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HdmiInput {
    Ossc1,
    Ossc2,
    Ossc3,
    Ossc4,
    Hd1,
    Hd2,
    Hd3,
    Hd4,
}

/// Component matrix outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentOutput {
    Ossc1,
    Ossc2,
    Ossc3,
    Ossc4,
    Crt1,
    Crt2,
    Crt3,
    Crt4,
}

/// Component matrix inputs, in wiring order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentInput {
    Scart4,
    Scart3,
    Scart2,
    Scart1,
    Comp4,
    Comp3,
    Comp2,
    Comp1,
}

impl HdmiOutput {
    pub fn port(self) -> u8 {
        match self {
            HdmiOutput::Stream1 => 0,
            HdmiOutput::Stream2 => 1,
            HdmiOutput::Stream3 => 2,
            HdmiOutput::Stream4 => 3,
            HdmiOutput::Lcd1 => 4,
            HdmiOutput::Lcd2 => 5,
            HdmiOutput::Lcd3 => 6,
            HdmiOutput::Lcd4 => 7,
        }
    }
}

impl HdmiInput {
    pub fn port(self) -> u8 {
        match self {
            HdmiInput::Ossc1 => 0,
            HdmiInput::Ossc2 => 1,
            HdmiInput::Ossc3 => 2,
            HdmiInput::Ossc4 => 3,
            HdmiInput::Hd1 => 4,
            HdmiInput::Hd2 => 5,
            HdmiInput::Hd3 => 6,
            HdmiInput::Hd4 => 7,
        }
    }

    pub fn from_port(port: u8) -> Option<Self> {
        match port {
            0 => Some(HdmiInput::Ossc1),
            1 => Some(HdmiInput::Ossc2),
            2 => Some(HdmiInput::Ossc3),
            3 => Some(HdmiInput::Ossc4),
            4 => Some(HdmiInput::Hd1),
            5 => Some(HdmiInput::Hd2),
            6 => Some(HdmiInput::Hd3),
            7 => Some(HdmiInput::Hd4),
            _ => None,
        }
    }
}

impl ComponentOutput {
    pub fn port(self) -> u8 {
        match self {
            ComponentOutput::Ossc1 => 0,
            ComponentOutput::Ossc2 => 1,
            ComponentOutput::Ossc3 => 2,
            ComponentOutput::Ossc4 => 3,
            ComponentOutput::Crt1 => 4,
            ComponentOutput::Crt2 => 5,
            ComponentOutput::Crt3 => 6,
            ComponentOutput::Crt4 => 7,
        }
    }
}

impl ComponentInput {
    pub fn port(self) -> u8 {
        match self {
            ComponentInput::Scart4 => 0,
            ComponentInput::Scart3 => 1,
            ComponentInput::Scart2 => 2,
            ComponentInput::Scart1 => 3,
            ComponentInput::Comp4 => 4,
            ComponentInput::Comp3 => 5,
            ComponentInput::Comp2 => 6,
            ComponentInput::Comp1 => 7,
        }
    }

    pub fn from_port(port: u8) -> Option<Self> {
        match port {
            0 => Some(ComponentInput::Scart4),
            1 => Some(ComponentInput::Scart3),
            2 => Some(ComponentInput::Scart2),
            3 => Some(ComponentInput::Scart1),
            4 => Some(ComponentInput::Comp4),
            5 => Some(ComponentInput::Comp3),
            6 => Some(ComponentInput::Comp2),
            7 => Some(ComponentInput::Comp1),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// Conversion tables
// -----------------------------------------------------------------------------

/// HDMI port feeding a virtual output; `None` for CRT-only outputs
pub fn virtual_output_to_hdmi_output(output: VirtualOutput) -> Option<HdmiOutput> {
    match output {
        VirtualOutput::Stream1 => Some(HdmiOutput::Stream1),
        VirtualOutput::Stream2 => Some(HdmiOutput::Stream2),
        VirtualOutput::Stream3 => Some(HdmiOutput::Stream3),
        VirtualOutput::Stream4 => Some(HdmiOutput::Stream4),
        VirtualOutput::Tv1 | VirtualOutput::Lcd1 => Some(HdmiOutput::Lcd1),
        VirtualOutput::Tv2 | VirtualOutput::Lcd2 => Some(HdmiOutput::Lcd2),
        VirtualOutput::Tv3 | VirtualOutput::Lcd3 => Some(HdmiOutput::Lcd3),
        VirtualOutput::Tv4 | VirtualOutput::Lcd4 => Some(HdmiOutput::Lcd4),
        VirtualOutput::Crt1
        | VirtualOutput::Crt2
        | VirtualOutput::Crt3
        | VirtualOutput::Crt4 => None,
    }
}

/// Component CRT port feeding a virtual output; `None` without a CRT
pub fn virtual_output_to_crt(output: VirtualOutput) -> Option<ComponentOutput> {
    match output {
        VirtualOutput::Tv1 | VirtualOutput::Crt1 => Some(ComponentOutput::Crt1),
        VirtualOutput::Tv2 | VirtualOutput::Crt2 => Some(ComponentOutput::Crt2),
        VirtualOutput::Tv3 | VirtualOutput::Crt3 => Some(ComponentOutput::Crt3),
        VirtualOutput::Tv4 | VirtualOutput::Crt4 => Some(ComponentOutput::Crt4),
        VirtualOutput::Stream1
        | VirtualOutput::Stream2
        | VirtualOutput::Stream3
        | VirtualOutput::Stream4
        | VirtualOutput::Lcd1
        | VirtualOutput::Lcd2
        | VirtualOutput::Lcd3
        | VirtualOutput::Lcd4 => None,
    }
}

/// How a virtual source enters the matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPath {
    /// Straight into the HDMI matrix
    Hdmi(HdmiInput),
    /// Into the component matrix, then through OSSC_k into the HDMI matrix
    Analog {
        source: ComponentInput,
        ossc_output: ComponentOutput,
        ossc_input: HdmiInput,
    },
}

/// Path for a virtual source; source number `k` of either analog kind
/// always travels over OSSC_k
pub fn virtual_input_path(input: VirtualInput) -> InputPath {
    let analog = |source, ossc_output, ossc_input| InputPath::Analog {
        source,
        ossc_output,
        ossc_input,
    };
    match input {
        VirtualInput::Hdmi1 => InputPath::Hdmi(HdmiInput::Hd1),
        VirtualInput::Hdmi2 => InputPath::Hdmi(HdmiInput::Hd2),
        VirtualInput::Hdmi3 => InputPath::Hdmi(HdmiInput::Hd3),
        VirtualInput::Hdmi4 => InputPath::Hdmi(HdmiInput::Hd4),
        VirtualInput::Comp1 => {
            analog(ComponentInput::Comp1, ComponentOutput::Ossc1, HdmiInput::Ossc1)
        }
        VirtualInput::Comp2 => {
            analog(ComponentInput::Comp2, ComponentOutput::Ossc2, HdmiInput::Ossc2)
        }
        VirtualInput::Comp3 => {
            analog(ComponentInput::Comp3, ComponentOutput::Ossc3, HdmiInput::Ossc3)
        }
        VirtualInput::Comp4 => {
            analog(ComponentInput::Comp4, ComponentOutput::Ossc4, HdmiInput::Ossc4)
        }
        VirtualInput::Scart1 => {
            analog(ComponentInput::Scart1, ComponentOutput::Ossc1, HdmiInput::Ossc1)
        }
        VirtualInput::Scart2 => {
            analog(ComponentInput::Scart2, ComponentOutput::Ossc2, HdmiInput::Ossc2)
        }
        VirtualInput::Scart3 => {
            analog(ComponentInput::Scart3, ComponentOutput::Ossc3, HdmiInput::Ossc3)
        }
        VirtualInput::Scart4 => {
            analog(ComponentInput::Scart4, ComponentOutput::Ossc4, HdmiInput::Ossc4)
        }
    }
}

/// Virtual source for a component matrix input
pub fn component_input_to_virtual_input(input: ComponentInput) -> VirtualInput {
    match input {
        ComponentInput::Comp1 => VirtualInput::Comp1,
        ComponentInput::Comp2 => VirtualInput::Comp2,
        ComponentInput::Comp3 => VirtualInput::Comp3,
        ComponentInput::Comp4 => VirtualInput::Comp4,
        ComponentInput::Scart1 => VirtualInput::Scart1,
        ComponentInput::Scart2 => VirtualInput::Scart2,
        ComponentInput::Scart3 => VirtualInput::Scart3,
        ComponentInput::Scart4 => VirtualInput::Scart4,
    }
}

/// Where an HDMI matrix input gets its picture from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HdmiSource {
    /// A native HDMI source
    Direct(VirtualInput),
    /// The OSSC fed by this component output
    Ossc(ComponentOutput),
}

pub fn hdmi_input_to_source(input: HdmiInput) -> HdmiSource {
    match input {
        HdmiInput::Ossc1 => HdmiSource::Ossc(ComponentOutput::Ossc1),
        HdmiInput::Ossc2 => HdmiSource::Ossc(ComponentOutput::Ossc2),
        HdmiInput::Ossc3 => HdmiSource::Ossc(ComponentOutput::Ossc3),
        HdmiInput::Ossc4 => HdmiSource::Ossc(ComponentOutput::Ossc4),
        HdmiInput::Hd1 => HdmiSource::Direct(VirtualInput::Hdmi1),
        HdmiInput::Hd2 => HdmiSource::Direct(VirtualInput::Hdmi2),
        HdmiInput::Hd3 => HdmiSource::Direct(VirtualInput::Hdmi3),
        HdmiInput::Hd4 => HdmiSource::Direct(VirtualInput::Hdmi4),
    }
}

// -----------------------------------------------------------------------------
// Route planning
// -----------------------------------------------------------------------------

/// Physical commands for one virtual route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    /// Exactly one HDMI call; a `None` output makes it a no-op
    pub hdmi: (Option<HdmiOutput>, HdmiInput),
    /// Component calls, in the order they should be issued
    pub component: Vec<(ComponentOutput, ComponentInput)>,
}

impl RoutePlan {
    /// Translate "show `input` on `output`"
    pub fn new(output: VirtualOutput, input: VirtualInput) -> Self {
        let hdmi_output = virtual_output_to_hdmi_output(output);

        match virtual_input_path(input) {
            InputPath::Hdmi(source) => Self {
                hdmi: (hdmi_output, source),
                component: Vec::new(),
            },
            InputPath::Analog {
                source,
                ossc_output,
                ossc_input,
            } => {
                let mut component = vec![(ossc_output, source)];
                if let Some(crt) = virtual_output_to_crt(output) {
                    component.push((crt, source));
                }
                Self {
                    hdmi: (hdmi_output, ossc_input),
                    component,
                }
            }
        }
    }

    /// Number of commands that actually reach hardware
    pub fn command_count(&self) -> usize {
        usize::from(self.hdmi.0.is_some()) + self.component.len()
    }
}

// -----------------------------------------------------------------------------
// Virtual state
// -----------------------------------------------------------------------------

fn trace_hdmi_port(port: HdmiOutput, hdmi: &[u8], component: &[u8]) -> Option<VirtualInput> {
    let input = HdmiInput::from_port(*hdmi.get(usize::from(port.port()))?)?;
    match hdmi_input_to_source(input) {
        HdmiSource::Direct(source) => Some(source),
        HdmiSource::Ossc(ossc) => read_component_port(ossc, component),
    }
}

fn read_component_port(port: ComponentOutput, component: &[u8]) -> Option<VirtualInput> {
    let input = ComponentInput::from_port(*component.get(usize::from(port.port()))?)?;
    Some(component_input_to_virtual_input(input))
}

/// Virtual input currently shown on one output
///
/// `None` when an output with both an LCD and a CRT path sees two different
/// sources, or when a physical state holds an index outside its tables.
pub fn virtual_input_for(
    output: VirtualOutput,
    hdmi: &[u8],
    component: &[u8],
) -> Option<VirtualInput> {
    let via_hdmi =
        virtual_output_to_hdmi_output(output).map(|port| trace_hdmi_port(port, hdmi, component));
    let via_crt = virtual_output_to_crt(output).map(|port| read_component_port(port, component));

    match (via_hdmi, via_crt) {
        (Some(lcd), Some(crt)) => {
            if lcd == crt {
                lcd
            } else {
                None
            }
        }
        (Some(only), None) | (None, Some(only)) => only,
        (None, None) => None,
    }
}

/// The virtual route vector: one entry per [`VirtualOutput`], in order
pub fn compute_virtual_state(hdmi: &[u8], component: &[u8]) -> Vec<Option<VirtualInput>> {
    VirtualOutput::ALL
        .iter()
        .map(|&output| virtual_input_for(output, hdmi, component))
        .collect()
}

// -----------------------------------------------------------------------------
// Validation
// -----------------------------------------------------------------------------

/// Rejected client arguments
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("{argument} must be a number, got {value:?}")]
    NotANumber {
        argument: &'static str,
        value: String,
    },

    #[error("{argument} must be between 0 and {max}, got {value}")]
    OutOfRange {
        argument: &'static str,
        value: i64,
        max: usize,
    },
}

fn parse_index(argument: &'static str, raw: &str, count: usize) -> Result<usize, RouteError> {
    let value: i64 = raw.trim().parse().map_err(|_| RouteError::NotANumber {
        argument,
        value: raw.to_string(),
    })?;
    let max = count - 1;
    usize::try_from(value)
        .ok()
        .filter(|&index| index <= max)
        .ok_or(RouteError::OutOfRange {
            argument,
            value,
            max,
        })
}

/// Parse a client-supplied virtual output index
pub fn parse_virtual_output(raw: &str) -> Result<VirtualOutput, RouteError> {
    let index = parse_index("output", raw, VirtualOutput::ALL.len())?;
    Ok(VirtualOutput::ALL[index])
}

/// Parse a client-supplied virtual input index
pub fn parse_virtual_input(raw: &str) -> Result<VirtualInput, RouteError> {
    let index = parse_index("input", raw, VirtualInput::ALL.len())?;
    Ok(VirtualInput::ALL[index])
}

use core::fmt;

/// Control function commands of the DS2409 MicroLAN coupler.
///
/// Every command is answered with a confirmation byte equal to the command.
/// The smart-on commands additionally expect a reset stimulus and return a
/// presence byte for the downstream branch before the confirmation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouplerCommand {
    /// Disconnect both branches.
    AllLinesOff = 0x66,
    /// Connect the main branch without a reset on it.
    DirectMainOn = 0xa5,
    /// Connect the main branch and generate a reset on it.
    SmartOnMain = 0xcc,
    /// Connect the auxiliary branch and generate a reset on it.
    SmartOnAux = 0x33,
    /// Pull both branches low to reset parasite powered devices.
    Discharge = 0x99,
}

impl CouplerCommand {
    /// Whether the command is followed by a reset stimulus and presence byte.
    pub const fn is_smart(self) -> bool {
        matches!(self, Self::SmartOnMain | Self::SmartOnAux)
    }
}

/// One of the two switchable outputs of a DS2409 coupler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// The main output.
    Main,
    /// The auxiliary output.
    Aux,
}

impl Branch {
    /// Branch identifier as stored alongside a coupler address, `0` for main
    /// and `1` for aux.
    pub const fn id(self) -> u8 {
        match self {
            Self::Main => 0,
            Self::Aux => 1,
        }
    }

    /// Command that activates this branch before reading a device behind it.
    pub const fn select_command(self) -> CouplerCommand {
        match self {
            Self::Main => CouplerCommand::DirectMainOn,
            Self::Aux => CouplerCommand::SmartOnAux,
        }
    }

    /// Command that activates this branch and resets it, ahead of a search.
    pub const fn search_command(self) -> CouplerCommand {
        match self {
            Self::Main => CouplerCommand::SmartOnMain,
            Self::Aux => CouplerCommand::SmartOnAux,
        }
    }

    /// Letter used for the branch in the persisted topology file.
    pub const fn letter(self) -> char {
        match self {
            Self::Main => 'M',
            Self::Aux => 'A',
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Aux => f.write_str("aux"),
        }
    }
}

//! Transport boundary to the device

use super::apdu::ApduCommand;
use crate::Result;

/// Delivers commands to a device and returns its replies
///
/// Implementations own the physical link (USB HID, TCP to an emulator, ...)
/// and map their failures to [`crate::errors::ClientError::Transport`].
pub trait Transport {
    /// Sends `command` and returns the reply data with its status word
    ///
    /// # Errors
    /// Returns an error if the command cannot be delivered or no reply arrives
    fn exchange(&mut self, command: &ApduCommand) -> Result<(Vec<u8>, u16)>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn exchange(&mut self, command: &ApduCommand) -> Result<(Vec<u8>, u16)> {
        (**self).exchange(command)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&mut self, command: &ApduCommand) -> Result<(Vec<u8>, u16)> {
        (**self).exchange(command)
    }
}

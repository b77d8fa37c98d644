/*!
    register catalogs

    a catalog is the static table of registers of one protocol revision of one device. Catalogs are keyed by `(who_am_i, revision)`, because firmwares of the same device family have reused addresses with incompatible payload types.
*/

use thiserror::Error;

use crate::{
    registers::{RegisterDescriptor, COMMON},
    frame::Frame,
    command,
    };


/// address with no entry in a catalog
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("no register at address {0} in catalog")]
pub struct UnknownRegister(pub u8);


/// static register table of one protocol revision
#[derive(Debug)]
pub struct Catalog {
    /// device family name
    pub device: &'static str,
    /// identity the device reports in [WHO_AM_I](crate::registers::WHO_AM_I)
    pub who_am_i: u16,
    /// protocol revision, distinguishing incompatible maps of a same device
    pub revision: u8,
    /// device specific registers, the common harp registers are implied
    pub registers: &'static [RegisterDescriptor],
}
impl Catalog {
    /// register at the given address, common harp registers included
    pub fn lookup(&self, address: u8) -> Result<&'static RegisterDescriptor, UnknownRegister> {
        self.registers.iter()
            .chain(COMMON.iter())
            .find(|register| register.address == address)
            .ok_or(UnknownRegister(address))
    }
    /// all registers, common ones first
    pub fn iter(&self) -> impl Iterator<Item = &'static RegisterDescriptor> {
        COMMON.iter().chain(self.registers.iter())
    }
    /// number of bytes needed to hold all registers
    pub fn memory(&self) -> usize {
        self.iter().map(RegisterDescriptor::size).sum()
    }
    /// request reading the register at the given address
    pub fn read_request(&self, address: u8) -> Result<Frame, UnknownRegister> {
        let register = self.lookup(address)?;
        Ok(command::read(register.address, register.wire))
    }
}

/// catalog of a known device revision
pub fn find(who_am_i: u16, revision: u8) -> Option<&'static Catalog> {
    crate::treadmill::CATALOGS.iter()
        .copied()
        .find(|catalog| catalog.who_am_i == who_am_i && catalog.revision == revision)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        payload::WireType,
        registers::AccessKind,
        treadmill,
        };

    #[test]
    fn lookup_application_and_common() {
        let catalog = &treadmill::CATALOG;
        assert_eq!(catalog.lookup(32).unwrap().name, "Encoder");
        assert_eq!(catalog.lookup(0).unwrap().name, "WhoAmI");
        assert_eq!(catalog.lookup(200), Err(UnknownRegister(200)));
        assert_eq!(catalog.lookup(20), Err(UnknownRegister(20)));
    }

    #[test]
    fn revisions_are_separate() {
        let signed = find(treadmill::WHO_AM_I, treadmill::Revision::Signed as u8).unwrap();
        let unsigned = find(treadmill::WHO_AM_I, treadmill::Revision::Unsigned as u8).unwrap();
        let raw = find(treadmill::WHO_AM_I, treadmill::Revision::Raw as u8).unwrap();
        assert_eq!(signed.lookup(32).unwrap().wire, WireType::S32);
        assert_eq!(unsigned.lookup(32).unwrap().wire, WireType::U32);
        assert_eq!(raw.lookup(32).unwrap().wire, WireType::U16);
        assert_eq!(raw.lookup(32).unwrap().name, "TorqueRaw");
        assert!(find(1234, 0).is_none());
    }

    #[test]
    fn addresses_are_unique() {
        for catalog in treadmill::CATALOGS {
            for (i, a) in catalog.iter().enumerate() {
                for b in catalog.iter().skip(i + 1) {
                    assert_ne!(a.address, b.address, "{} and {} share an address in revision {}", a.name, b.name, catalog.revision);
                }
            }
        }
    }

    #[test]
    fn read_request_checks_catalog() {
        let request = treadmill::CATALOG.read_request(35).unwrap();
        assert_eq!(request.wire(), WireType::S32);
        assert_eq!(treadmill::CATALOG.read_request(99), Err(UnknownRegister(99)));
        assert_eq!(treadmill::CATALOG.lookup(36).unwrap().access, AccessKind::ReadWrite);
    }
}

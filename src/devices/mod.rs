/*
 * Device Contracts
 *
 * The kernel core does not drive hardware. This module holds the narrow
 * contracts it consumes from the driver layer, plus memory-backed
 * implementations used while bringing the system up and in the test
 * suite.
 */

pub mod block;

pub use block::{BlockDevice, RamDisk, SECTOR_SIZE};

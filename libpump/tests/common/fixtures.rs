// fixtures.rs: captured frames and ready-made device states

use chrono::FixedOffset;
use libpump::minimed::{PumpModel, PumpRegion, PumpState};
use libpump::omnipod::{FirmwareVersion, PodState, SetupProgress};
use libpump::{PodAddress, PumpId};

use super::helpers::utc;

pub const PUMP: PumpId = PumpId::from_bytes([0x35, 0x05, 0x35]);
pub const POD: PodAddress = PodAddress::new(0x1f00ee87);

pub const POD_LOT: u32 = 42560;
pub const POD_TID: u32 = 661771;

/// Pod reply to address assignment: pi and pm 2.7.0, lot a377, tid 060309.
pub const ASSIGN_ADDRESS_REPLY: &str = "011502070002070002020000a377000603091f1f00ee87";
/// Pod reply to setup, progress status "pairing completed".
pub const SETUP_POD_REPLY: &str = "011b13881008340a5002070002070002030000a377000603091f00ee87";
/// Detailed status of a pod that faulted during priming.
pub const PRIMING_FAULT: &str = "0216020f0000000900345c000103ff0001000005ae056029";
/// Get-status message from the PDM with its CRC trailer.
pub const GET_STATUS_MESSAGE: &str = "1f01482a10030e0100802c";

/// A 523 that has just been woken.
pub fn awake_pump() -> PumpState {
    let mut pump = PumpState::new(PUMP, PumpRegion::NorthAmerica, FixedOffset::west_opt(4 * 3600).unwrap());
    pump.pump_model = Some(PumpModel::MODEL_523);
    pump.awake_until = Some(utc(2022, 9, 11, 3, 5, 0));
    pump
}

/// A pod past setup, delivering its basal schedule.
pub fn running_pod() -> PodState {
    let version = FirmwareVersion {
        major: 2,
        minor: 7,
        patch: 0,
    };
    let mut pod = PodState::new(POD, utc(2024, 3, 1, 8, 0, 0), version, version, POD_LOT, POD_TID);
    pod.setup_progress = SetupProgress::Completed;
    pod
}

/// Body of a 523 history page (1022 bytes before the trailer); the zero
/// padding after the records is left out.
pub const HISTORY_PAGE_BODY: &str = concat!(
    "5be409a20a1510325000784b502800a400002400a8965c0b404fc038cbd008d5d0010080008000240009a24a15107b05",
    "00800c1510180a000ade19a32c15105bde2ba30c1510325000b44b5024006c0000200070965c0b4c78c03482c040c8c0",
    "01007000700020002ba34c15100a0c22932d75903f2122938d7510c527ad5b0006900f15101a5000b44b500000380000",
    "000038965c0e70a1c04c19d03423d04069d00100380038000c0006904f15107b060080101510200e005b0034ab101510",
    "0d5000784b500000280000000028965c113858c070f8c04c70d0347ad040c0d00100280028001c0034ab5015100ab005",
    "863175903f360586117510c527ad5bb01486111510005100784b50940000000038005c965c14281fc0386fc0700fd04c",
    "87d03491d040d7d001005c005c00380014865115105b002291121510285000784b500000840000000084965c145c48c0",
    "2866c038b6c07056d04cced034d8d0010084008400480022915215107b07008013151026100021000384141510030000",
    "00360785341510064a097e009e54b5100c4a03a11415107b0704a11415102610007b0704a11415102610007b0710a114",
    "1510261000030003000306a11415100ae937a23475103f1d37a2347510c527ad5be91ea3141510165000784b502c0048",
    "0000140060965c0e848cc05cd2c028f0c03840d001006000600014001ea35415107b0800801515102a13000a5621ba35",
    "15905b5623ba151510005100b455505800000000340024965c116053c084dfc05c25d02843d03893d001002400240034",
    "0023ba5515105b00188c161510005000b455500000000000000000965c142411c06061c084edc05c33d02851d038a1d0",
    "0100180018004c00188c561510",
);

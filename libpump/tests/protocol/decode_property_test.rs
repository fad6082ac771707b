// Decoders see whatever the radio hands back; none of them may panic.

use libpump::minimed::{HistoryPage, MinimedPacket, PumpMessage, PumpModel};
use libpump::omnipod::{MessageBlock, PodMessage, PodPacket};
use libpump::protocol::{decode_4b6b, encode_4b6b};
use proptest::prelude::*;

proptest! {
    #[test]
    fn fourbsixb_round_trips(data in proptest::collection::vec(any::<u8>(), 0..96)) {
        prop_assert_eq!(decode_4b6b(&encode_4b6b(&data)), Some(data));
    }

    #[test]
    fn radio_decoders_never_panic(raw in proptest::collection::vec(any::<u8>(), 0..128)) {
        let _ = decode_4b6b(&raw);
        let _ = MinimedPacket::decode(&raw);
        let _ = PumpMessage::decode(&raw);
        let _ = PodPacket::decode(&raw);
        let _ = PodMessage::decode(&raw);
        let _ = MessageBlock::decode(&raw);
    }

    #[test]
    fn history_parser_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..1100)) {
        let _ = HistoryPage::parse(&raw, PumpModel::MODEL_523);
        let _ = HistoryPage::parse(&raw, PumpModel::MODEL_515);
    }
}

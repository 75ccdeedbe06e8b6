// tests/integration_tests.rs
//! End-to-end scenarios exercising the codec and the component model
//! together.

use std::sync::Arc;

use ice_stack::stun::message::{self, BINDING_REQUEST, BINDING_RESPONSE};
use ice_stack::{
    Attribute, AttributeType, Candidate, CandidateType, Component, CredentialKey, Integrity,
    LocalCandidate, Message, MessageClass, StackConfig, StackError, StreamId, StunError,
    TransactionId, Transport, TransportAddress,
};

fn tid() -> TransactionId {
    TransactionId::from_bytes([
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
    ])
}

fn addr(s: &str) -> TransportAddress {
    TransportAddress::udp(s.parse().unwrap())
}

#[test]
fn test_minimal_binding_request_roundtrip() {
    let bytes = [
        0x00u8, 0x01, 0x00, 0x00, // Binding Request, length 0
        0x21, 0x12, 0xA4, 0x42, // magic cookie
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B,
    ];

    let message = Message::decode(&bytes).unwrap();
    assert_eq!(message.message_type(), BINDING_REQUEST);
    assert_eq!(message.transaction_id(), &tid());
    assert_eq!(message.attribute_count(), 0);

    let encoded = message.encode(&StackConfig::default()).unwrap();
    assert_eq!(&encoded[..], &bytes[..]);
}

#[test]
fn test_binding_response_with_xor_mapped_address() {
    let mapped: std::net::SocketAddr = "192.0.2.1:32853".parse().unwrap();

    let mut message = Message::binding_response(tid());
    message
        .add_attribute(Attribute::XorMappedAddress(mapped))
        .unwrap();

    let encoded = message.encode(&StackConfig::default()).unwrap();

    // 0x8055 XOR 0x2112 = 0xA147; 0xC0000201 XOR 0x2112A442 = 0xE112A643
    assert_eq!(
        &encoded[message::HEADER_LENGTH..],
        &[0x00, 0x20, 0x00, 0x08, 0x00, 0x01, 0xA1, 0x47, 0xE1, 0x12, 0xA6, 0x43]
    );

    let decoded = Message::decode(&encoded).unwrap();
    assert_eq!(decoded.message_type(), BINDING_RESPONSE);
    assert_eq!(
        decoded.get_attribute(AttributeType::XOR_MAPPED_ADDRESS),
        Some(&Attribute::XorMappedAddress(mapped))
    );
}

#[test]
fn test_fingerprint_is_last_and_validates() {
    let mut message = Message::binding_request(tid());
    message
        .add_attribute(Attribute::Username("user".to_string()))
        .unwrap();
    message.add_attribute(Attribute::Fingerprint(0)).unwrap();

    let encoded = message.encode(&StackConfig::default()).unwrap();

    let tail = &encoded[encoded.len() - 8..];
    assert_eq!(&tail[..4], &[0x80, 0x28, 0x00, 0x04]);

    let expected = crc32fast::hash(&encoded[..encoded.len() - 8]) ^ 0x5354554E;
    assert_eq!(&tail[4..], &expected.to_be_bytes());

    // decoding recomputes the CRC and must accept its own output
    let decoded = Message::decode(&encoded).unwrap();
    assert_eq!(
        decoded.get_attribute(AttributeType::FINGERPRINT),
        Some(&Attribute::Fingerprint(expected))
    );
}

#[test]
fn test_always_sign_synthesizes_fingerprint() {
    let config = StackConfig {
        always_sign: true,
        ..StackConfig::default()
    };

    let message = Message::binding_request(tid());
    let encoded = message.encode(&config).unwrap();

    assert_eq!(encoded.len(), message::HEADER_LENGTH + 8);
    assert!(Message::decode(&encoded).is_ok());
}

#[test]
fn test_corrupted_fingerprint_is_malformed() {
    let mut message = Message::binding_request(tid());
    message.add_attribute(Attribute::Fingerprint(0)).unwrap();

    let mut encoded = message.encode(&StackConfig::default()).unwrap();
    let last = encoded.len() - 1;
    encoded[last] ^= 0xFF;

    let err = Message::decode(&encoded).unwrap_err();
    assert!(matches!(
        err,
        StackError::Stun(StunError::Malformed(ref reason)) if reason.contains("fingerprint")
    ));
}

#[test]
fn test_truncated_message_is_malformed() {
    let bytes = [0u8; 19];
    let err = Message::decode(&bytes).unwrap_err();
    assert!(matches!(err, StackError::Stun(StunError::Malformed(_))));
}

#[test]
fn test_send_indication_missing_peer_address() {
    let mut message = Message::send_indication(tid());

    // DATA alone is fine to add...
    message
        .add_attribute(Attribute::Data(vec![0xDE, 0xAD, 0xBE, 0xEF]))
        .unwrap();
    assert_eq!(message.class(), MessageClass::Indication);

    // ...and fine to encode while mandatory enforcement is off
    message.encode(&StackConfig::default()).unwrap();

    // with enforcement on, the missing XOR-PEER-ADDRESS is fatal
    let strict = StackConfig {
        rfc3489_compat: true,
        ..StackConfig::default()
    };
    let err = message.encode(&strict).unwrap_err();
    assert!(matches!(
        err,
        StackError::Stun(StunError::InvalidState(ref attribute))
            if attribute == "XOR-PEER-ADDRESS"
    ));

    let peer: std::net::SocketAddr = "198.51.100.2:49170".parse().unwrap();
    message
        .add_attribute(Attribute::XorPeerAddress(peer))
        .unwrap();
    message.encode(&strict).unwrap();
}

#[test]
fn test_roundtrip_preserves_attribute_order_and_values() {
    let mut message = Message::allocate_request(tid());
    message
        .add_attribute(Attribute::RequestedTransport(17))
        .unwrap();
    message.add_attribute(Attribute::Lifetime(600)).unwrap();
    message
        .add_attribute(Attribute::Username("alice".to_string()))
        .unwrap();
    message.add_attribute(Attribute::DontFragment).unwrap();

    let encoded = message.encode(&StackConfig::default()).unwrap();

    // the header length field covers headers, payloads and padding
    let declared = u16::from_be_bytes([encoded[2], encoded[3]]);
    assert_eq!(declared, message.data_length());
    assert_eq!(encoded.len(), message::HEADER_LENGTH + declared as usize);

    let decoded = Message::decode(&encoded).unwrap();
    assert_eq!(decoded, message);
}

#[test]
fn test_message_integrity_roundtrip() {
    let key = CredentialKey::long_term("panda", "raspberry", "panda");

    let mut message = Message::allocate_request(tid());
    message
        .add_attribute(Attribute::Username("panda".to_string()))
        .unwrap();
    message
        .add_attribute(Attribute::MessageIntegrity(Integrity::Key(key.clone())))
        .unwrap();

    let encoded = message.encode(&StackConfig::default()).unwrap();
    Message::verify_integrity(&encoded, &key).unwrap();

    let decoded = Message::decode(&encoded).unwrap();
    match decoded.get_attribute(AttributeType::MESSAGE_INTEGRITY) {
        Some(Attribute::MessageIntegrity(Integrity::Digest(_))) => {}
        other => panic!("unexpected MESSAGE-INTEGRITY value: {:?}", other),
    }

    // a flipped payload byte breaks the digest
    let mut tampered = encoded.clone();
    tampered[message::HEADER_LENGTH + 5] ^= 0x01;
    assert!(Message::verify_integrity(&tampered, &key).is_err());
}

#[test]
fn test_component_prioritization_and_redundancy() {
    let component = Component::new(1, Transport::Udp, StreamId::new("audio")).unwrap();

    // local preferences drive the computed priorities: 100, 500, 300
    component.add_local_candidates(vec![
        LocalCandidate::new(
            Candidate::host(addr("10.0.0.1:1000")).with_local_preference(100),
        ),
        LocalCandidate::new(
            Candidate::host(addr("10.0.0.2:1000")).with_local_preference(500),
        ),
        LocalCandidate::new(
            Candidate::host(addr("10.0.0.3:1000")).with_local_preference(300),
        ),
    ]);

    component.prioritize_candidates();

    let ordered: Vec<u16> = component
        .local_candidates()
        .iter()
        .map(|c| c.local_preference())
        .collect();
    assert_eq!(ordered, vec![500, 300, 100]);

    for pair in component.local_candidates().windows(2) {
        assert!(pair[0].priority() >= pair[1].priority());
    }

    // a fourth candidate duplicating the weakest one's (address, base)
    // with a lower priority disappears in the redundancy pass
    let mut duplicate = Candidate::host(addr("10.0.0.1:1000"));
    duplicate.set_priority(200);
    component.add_local_candidate(LocalCandidate::new(duplicate));

    component.eliminate_redundant_candidates();

    let survivors = component.local_candidates();
    assert_eq!(survivors.len(), 3);

    let of_duplicated_address: Vec<&LocalCandidate> = survivors
        .iter()
        .filter(|c| c.transport_address() == &addr("10.0.0.1:1000"))
        .collect();
    assert_eq!(of_duplicated_address.len(), 1);
    assert_eq!(of_duplicated_address[0].local_preference(), 100);
}

#[test]
fn test_redundancy_pass_ignores_distinct_bases() {
    let component = Component::new(1, Transport::Udp, StreamId::new("video")).unwrap();

    let mut reflexive = Candidate::new(
        addr("203.0.113.7:9000"),
        addr("192.168.1.4:9000"),
        CandidateType::ServerReflexive,
    );
    reflexive.set_priority(900);

    let mut relayed = Candidate::new(
        addr("203.0.113.7:9000"),
        addr("203.0.113.200:9000"),
        CandidateType::Relayed,
    );
    relayed.set_priority(100);

    component.add_local_candidates(vec![
        LocalCandidate::new(reflexive),
        LocalCandidate::new(relayed),
    ]);

    component.eliminate_redundant_candidates();
    assert_eq!(component.local_candidate_count(), 2);
}

#[test]
fn test_concurrent_harvest_then_prioritize() {
    let component =
        Arc::new(Component::new(1, Transport::Udp, StreamId::new("audio")).unwrap());

    let mut handles = Vec::new();
    for thread_index in 0u16..4 {
        let component = Arc::clone(&component);
        handles.push(std::thread::spawn(move || {
            for port_index in 0u16..25 {
                let port = 10_000 + thread_index * 100 + port_index;
                let address = addr(&format!("10.1.2.3:{}", port));
                component.add_local_candidate(LocalCandidate::new(Candidate::host(address)));
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(component.local_candidate_count(), 100);

    component.prioritize_candidates();
    for pair in component.local_candidates().windows(2) {
        assert!(pair[0].priority() >= pair[1].priority());
    }
}

#[test]
fn test_connectivity_check_attributes_on_binding_request_only() {
    let mut request = Message::binding_request(tid());
    request.add_attribute(Attribute::Priority(0x6E_00_28_FF)).unwrap();
    request.add_attribute(Attribute::IceControlling(0x1122334455667788)).unwrap();
    request.add_attribute(Attribute::UseCandidate).unwrap();

    let encoded = request.encode(&StackConfig::default()).unwrap();
    assert_eq!(Message::decode(&encoded).unwrap(), request);

    // the same attributes are not applicable to a Binding Response
    let mut response = Message::binding_response(tid());
    assert!(response.add_attribute(Attribute::Priority(1)).is_err());
    assert!(response.add_attribute(Attribute::UseCandidate).is_err());
    assert!(response
        .add_attribute(Attribute::IceControlled(7))
        .is_err());
}

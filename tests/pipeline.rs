use zabbix_ingest::classify::FALLBACK_RULE;
use zabbix_ingest::sink::{LineProtocolSink, MetricSink};
use zabbix_ingest::{classify, parse_payload, FieldValue, ParseError, Stage};


fn payload(key: &str, value: &str) -> String {
    format!(
        "{{'host': 'web01', 'clock': 1600000000, 'value': {}, 'key': '{}', 'server': 'zbx01'}}",
        value, key
    )
}

#[test]
fn plain_dotted_key() {
    let point = parse_payload(payload("cpu.idle", "97.5").as_bytes()).unwrap();
    assert_eq!(point.measurement, "cpu");
    assert_eq!(point.fields.len(), 1);
    assert_eq!(point.fields["idle"], FieldValue::Float(97.5));
    assert_eq!(point.tags.keys().collect::<Vec<_>>(), vec!["host", "server"]);
}

#[test]
fn unnamed_cpu_parameter() {
    let point = parse_payload(payload("system.cpu.util[,idle]", "3").as_bytes()).unwrap();
    assert_eq!(point.measurement, "system");
    assert_eq!(point.fields["cpu.idle"], FieldValue::Float(3.0));
}

#[test]
fn network_interface() {
    let point = parse_payload(payload("net.if.in[eth0,bytes]", "1024").as_bytes()).unwrap();
    assert_eq!(point.measurement, "net");
    assert_eq!(point.tags["interface"], "eth0");
    assert_eq!(point.fields["if.in.bytes"], FieldValue::Float(1024.0));
}

#[test]
fn custom_drive() {
    let point = parse_payload(payload("custom.vfs.dev.read.ops[sda]", "12").as_bytes()).unwrap();
    assert_eq!(point.measurement, "custom.vfs.dev");
    assert_eq!(point.tags["drive"], "sda");
    assert_eq!(point.fields["read.ops"], FieldValue::Float(12.0));
}

#[test]
fn nested_brackets_keep_the_raw_key() {
    let key = r#"grpavg["app-searchautocomplete","system.cpu.util[,user]",last,0]"#;
    let structured = classify(key, FieldValue::Float(1.0));
    assert_eq!(structured.rule, FALLBACK_RULE);
    assert_eq!(structured.measurement, key);
    assert_eq!(structured.fields["value"], FieldValue::Float(1.0));
}

#[test]
fn missing_clock_is_reported_not_fatal() {
    let bad = "{'host': 'web01', 'value': 1, 'key': 'cpu.idle', 'server': 'zbx01'}";
    let err = parse_payload(bad.as_bytes()).unwrap_err();
    assert!(matches!(err, ParseError::MalformedPayload { .. }));
    assert_eq!(err.stage(), Stage::Extract);

    // The next payload still parses.
    assert!(parse_payload(payload("cpu.idle", "1").as_bytes()).is_ok());
}

#[test]
fn end_to_end_line_protocol() {
    let points = vec![
        parse_payload(payload("net.if.out[eth1,packets]", "5").as_bytes()).unwrap(),
        parse_payload(payload("agent.version", "'5.0.1'").as_bytes()).unwrap(),
    ];
    let mut sink = LineProtocolSink::new(Vec::new());
    sink.write(&points).unwrap();
    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert_eq!(
        out,
        "net,host=web01,interface=eth1,server=zbx01 if.out.packets=5 1600000000000000000\n\
         agent,host=web01,server=zbx01 version=\"'5.0.1'\" 1600000000000000000\n"
    );
}

use std::env;
use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;

fn temp_path(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    path.push(format!("sniffer-{}-{}", std::process::id(), name));
    let _ = fs::remove_file(&path);
    path
}

fn ipv4(proto: u8, src: [u8; 4], dst: [u8; 4], l4: &[u8]) -> Vec<u8> {
    let total = (20 + l4.len()) as u16;
    let mut v = vec![0x45, 0];
    v.extend_from_slice(&total.to_be_bytes());
    v.extend_from_slice(&[0, 1, 0x40, 0, 64, proto, 0, 0]);
    v.extend_from_slice(&src);
    v.extend_from_slice(&dst);
    v.extend_from_slice(l4);
    v
}

fn ethernet(ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut v = vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb];
    v.extend_from_slice(&ethertype.to_be_bytes());
    v.extend_from_slice(payload);
    v
}

fn tcp_syn(sport: u16, dport: u16) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&sport.to_be_bytes());
    v.extend_from_slice(&dport.to_be_bytes());
    v.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0, 0x50, 0x02, 0xff, 0xff, 0, 0, 0, 0]);
    v
}

fn udp(sport: u16, dport: u16) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&sport.to_be_bytes());
    v.extend_from_slice(&dport.to_be_bytes());
    v.extend_from_slice(&[0, 8, 0, 0]);
    v
}

/// Legacy pcap file: TCP SYN, UDP, ARP, truncated TCP
fn write_capture(name: &str) -> PathBuf {
    let frames = vec![
        ethernet(0x0800, &ipv4(6, [10, 0, 0, 1], [10, 0, 0, 2], &tcp_syn(443, 51000))),
        ethernet(0x0800, &ipv4(17, [10, 0, 0, 3], [8, 8, 8, 8], &udp(5353, 53))),
        ethernet(0x0806, &[0x00, 0x01, 0x08, 0x00, 6, 4, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]),
        ethernet(0x0800, &ipv4(6, [10, 0, 0, 1], [10, 0, 0, 2], &tcp_syn(443, 51000)[..10])),
    ];
    let mut v = Vec::new();
    v.extend_from_slice(&0xa1b2_c3d4_u32.to_le_bytes());
    v.extend_from_slice(&[2, 0, 4, 0]);
    v.extend_from_slice(&[0; 8]);
    v.extend_from_slice(&65535_u32.to_le_bytes());
    v.extend_from_slice(&1_u32.to_le_bytes());
    for (i, frame) in frames.iter().enumerate() {
        v.extend_from_slice(&(1_000 + i as u32).to_le_bytes());
        v.extend_from_slice(&250_000_u32.to_le_bytes());
        v.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        v.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        v.extend_from_slice(frame);
    }
    let path = temp_path(name);
    fs::write(&path, v).unwrap();
    path
}

fn sniffer() -> Command {
    Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap()
}

#[test]
fn test_help() {
    let output = sniffer().arg("--help").output().unwrap();
    assert!(output.status.success());
}

#[test]
fn test_replay_prints_ipv4_packets() {
    let capture = write_capture("replay.pcap");
    let output = sniffer().arg("--read").arg(&capture).arg("--no-log").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2, "{stdout}");
    assert!(lines[0].contains("10.0.0.1 -> 10.0.0.2"));
    assert!(lines[0].contains("TCP"));
    assert!(lines[0].contains("S--"));
    assert!(lines[1].contains("UDP"));
    let _ = fs::remove_file(&capture);
}

#[test]
fn test_replay_json_with_filter() {
    let capture = write_capture("json.pcap");
    let output = sniffer()
        .arg("--read")
        .arg(&capture)
        .args(["--no-log", "--json", "--proto", "udp"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "{stdout}");
    let summary: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(summary["sequence_id"], 2);
    assert_eq!(summary["protocol"], "UDP");
    assert_eq!(summary["source"], "10.0.0.3");
    assert_eq!(summary["elapsed_seconds"], 1.0);
    let _ = fs::remove_file(&capture);
}

#[test]
fn test_show_packet_detail() {
    let capture = write_capture("show.pcap");
    let output = sniffer()
        .arg("--read")
        .arg(&capture)
        .args(["--no-log", "--proto", "icmp", "--show", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Source port: 443"));
    assert!(stdout.contains("45 00 00 28"));
    assert!(stdout.contains("TCP header:"));
    assert!(stdout.contains(" - Flags: SYN"));
    let _ = fs::remove_file(&capture);
}

#[test]
fn test_invalid_port_filter() {
    let capture = write_capture("badport.pcap");
    let output = sniffer()
        .arg("--read")
        .arg(&capture)
        .args(["--no-log", "--sport", "abc"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("abc"));
    let _ = fs::remove_file(&capture);
}

#[test]
fn test_missing_capture_file() {
    let output = sniffer()
        .args(["--read", "/nonexistent/capture.pcap", "--no-log"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_packet_log_accumulates() {
    let capture = write_capture("log.pcap");
    let log = temp_path("packet_log.csv");
    for _ in 0..2 {
        let output = sniffer()
            .arg("--read")
            .arg(&capture)
            .arg("--log-file")
            .arg(&log)
            .output()
            .unwrap();
        assert!(output.status.success());
    }
    let content = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5, "{content}");
    assert_eq!(
        lines[0],
        "ID,Source IP,Destination IP,TTL,TOS,Source Port,Destination Port,Flags,Protocol"
    );
    assert_eq!(lines[1], "1,10.0.0.1,10.0.0.2,64,0,443,51000,S--,TCP");
    assert_eq!(lines[2], "2,10.0.0.3,8.8.8.8,64,0,5353,53,-,UDP");
    assert_eq!(lines[3], lines[1]);
    let _ = fs::remove_file(&capture);
    let _ = fs::remove_file(&log);
}

#[test]
fn test_count_limits_stored_packets() {
    let capture = write_capture("count.pcap");
    let log = temp_path("count_log.csv");
    let output = sniffer()
        .arg("--read")
        .arg(&capture)
        .arg("--log-file")
        .arg(&log)
        .args(["--count", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1, "{stdout}");
    let content = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2, "{content}");
    assert!(lines[1].starts_with("1,10.0.0.1,10.0.0.2,"));
    let _ = fs::remove_file(&capture);
    let _ = fs::remove_file(&log);
}

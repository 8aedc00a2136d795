//! Status tiers and DDoS subtype labelling.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::core::aggregator::FlowStat;
use crate::core::capture::Protocol;

/// Risk at or above which a flow is reported as an attack
pub const ATTACK_RISK: u8 = 90;
/// Risk at or above which a flow is monitored
pub const ANOMALY_RISK: u8 = 50;
/// A dominant protocol must exceed this many packets to name a flood
pub const FLOOD_MIN_PACKETS: u64 = 50;

/// Status tier of a classified flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    Normal,
    Monitored,
    DdosAttack,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Normal => "Normal",
            FlowStatus::Monitored => "Monitored",
            FlowStatus::DdosAttack => "DDoS Attack",
        }
    }
}

/// DDoS subtype label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdosType {
    LowRiskFlow,
    PotentialAnomaly,
    TcpFlood,
    UdpFlood,
    IcmpFlood,
    ComplexFlood,
}

impl DdosType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DdosType::LowRiskFlow => "Low-Risk Flow",
            DdosType::PotentialAnomaly => "Potential Anomaly",
            DdosType::TcpFlood => "SYN/TCP Flood",
            DdosType::UdpFlood => "UDP Flood",
            DdosType::IcmpFlood => "ICMP Flood",
            DdosType::ComplexFlood => "Complex Flood",
        }
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {$(
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    )*};
}

display_as_str!(FlowStatus, DdosType);

/// A scored and labelled flow, immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedFlow {
    #[serde(flatten)]
    pub stat: FlowStat,
    pub risk: u8,
    pub status: FlowStatus,
    pub ddos_type: DdosType,
    #[serde(rename = "packet_type")]
    pub dominant_protocol: Protocol,
}

impl ClassifiedFlow {
    pub fn ip(&self) -> &str {
        &self.stat.source_ip
    }
}

/// Protocol with the highest count among TCP, UDP and ICMP; ties go to TCP,
/// then UDP. Packets of other protocols never make a flow dominant.
pub fn dominant_protocol(stat: &FlowStat) -> Protocol {
    let candidates = [
        (Protocol::Tcp, stat.tcp_count),
        (Protocol::Udp, stat.udp_count),
        (Protocol::Icmp, stat.icmp_count),
    ];

    let mut best = candidates[0];
    for candidate in &candidates[1..] {
        if candidate.1 > best.1 {
            best = *candidate;
        }
    }
    best.0
}

fn flood_type(stat: &FlowStat) -> DdosType {
    let (tcp, udp, icmp) = (stat.tcp_count, stat.udp_count, stat.icmp_count);

    if tcp > udp * 2 && tcp > FLOOD_MIN_PACKETS {
        DdosType::TcpFlood
    } else if udp > tcp * 2 && udp > FLOOD_MIN_PACKETS {
        DdosType::UdpFlood
    } else if icmp > tcp + udp && icmp > FLOOD_MIN_PACKETS {
        DdosType::IcmpFlood
    } else {
        DdosType::ComplexFlood
    }
}

/// Attach a risk score to a flow and derive its status and subtype.
pub fn classify(stat: FlowStat, risk: u8) -> ClassifiedFlow {
    let (status, ddos_type) = if risk >= ATTACK_RISK {
        (FlowStatus::DdosAttack, flood_type(&stat))
    } else if risk >= ANOMALY_RISK {
        (FlowStatus::Monitored, DdosType::PotentialAnomaly)
    } else {
        (FlowStatus::Normal, DdosType::LowRiskFlow)
    };

    ClassifiedFlow {
        dominant_protocol: dominant_protocol(&stat),
        stat,
        risk,
        status,
        ddos_type,
    }
}

//! Shared primitive types used across the entire engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A calendar year of observation.
pub type Year = u16;

/// Inhabitants used for per-100k rate normalisation.
pub const RATE_BASE: f64 = 100_000.0;

/// The fixed enumeration of 27 federative units the engine accepts.
///
/// Declaration order is alphabetical by code and doubles as the
/// canonical variable ordering for every optimizer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegionCode {
    AC, AL, AM, AP, BA, CE, DF, ES, GO,
    MA, MG, MS, MT, PA, PB, PE, PI, PR,
    RJ, RN, RO, RR, RS, SC, SE, SP, TO,
}

impl RegionCode {
    pub const ALL: [RegionCode; 27] = [
        Self::AC, Self::AL, Self::AM, Self::AP, Self::BA, Self::CE, Self::DF, Self::ES, Self::GO,
        Self::MA, Self::MG, Self::MS, Self::MT, Self::PA, Self::PB, Self::PE, Self::PI, Self::PR,
        Self::RJ, Self::RN, Self::RO, Self::RR, Self::RS, Self::SC, Self::SE, Self::SP, Self::TO,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Self::AC => "AC", Self::AL => "AL", Self::AM => "AM", Self::AP => "AP",
            Self::BA => "BA", Self::CE => "CE", Self::DF => "DF", Self::ES => "ES",
            Self::GO => "GO", Self::MA => "MA", Self::MG => "MG", Self::MS => "MS",
            Self::MT => "MT", Self::PA => "PA", Self::PB => "PB", Self::PE => "PE",
            Self::PI => "PI", Self::PR => "PR", Self::RJ => "RJ", Self::RN => "RN",
            Self::RO => "RO", Self::RR => "RR", Self::RS => "RS", Self::SC => "SC",
            Self::SE => "SE", Self::SP => "SP", Self::TO => "TO",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AC => "Acre",
            Self::AL => "Alagoas",
            Self::AM => "Amazonas",
            Self::AP => "Amapá",
            Self::BA => "Bahia",
            Self::CE => "Ceará",
            Self::DF => "Distrito Federal",
            Self::ES => "Espírito Santo",
            Self::GO => "Goiás",
            Self::MA => "Maranhão",
            Self::MG => "Minas Gerais",
            Self::MS => "Mato Grosso do Sul",
            Self::MT => "Mato Grosso",
            Self::PA => "Pará",
            Self::PB => "Paraíba",
            Self::PE => "Pernambuco",
            Self::PI => "Piauí",
            Self::PR => "Paraná",
            Self::RJ => "Rio de Janeiro",
            Self::RN => "Rio Grande do Norte",
            Self::RO => "Rondônia",
            Self::RR => "Roraima",
            Self::RS => "Rio Grande do Sul",
            Self::SC => "Santa Catarina",
            Self::SE => "Sergipe",
            Self::SP => "São Paulo",
            Self::TO => "Tocantins",
        }
    }

    /// The administrative macro-region this unit belongs to.
    /// Used as the peer group for elasticity fallback.
    pub fn peer_group(&self) -> PeerGroup {
        match self {
            Self::AC | Self::AM | Self::AP | Self::PA | Self::RO | Self::RR | Self::TO => {
                PeerGroup::Norte
            }
            Self::AL | Self::BA | Self::CE | Self::MA | Self::PB | Self::PE | Self::PI
            | Self::RN | Self::SE => PeerGroup::Nordeste,
            Self::DF | Self::GO | Self::MS | Self::MT => PeerGroup::CentroOeste,
            Self::ES | Self::MG | Self::RJ | Self::SP => PeerGroup::Sudeste,
            Self::PR | Self::RS | Self::SC => PeerGroup::Sul,
        }
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RegionCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.code() == wanted)
            .ok_or_else(|| format!("unknown region code '{s}'"))
    }
}

/// Macro-regions grouping the federative units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerGroup {
    Norte,
    Nordeste,
    CentroOeste,
    Sudeste,
    Sul,
}

impl PeerGroup {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Norte       => "Norte",
            Self::Nordeste    => "Nordeste",
            Self::CentroOeste => "Centro-Oeste",
            Self::Sudeste     => "Sudeste",
            Self::Sul         => "Sul",
        }
    }
}

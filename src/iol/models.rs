//! InvertirOnline request/response types
//!
//! The API speaks Spanish; fields are renamed to English on the way in.

use clap::ValueEnum;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;

use crate::de::lenient_opt_f64;

/// Exchange a symbol is listed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Market {
    #[default]
    #[value(name = "bCBA")]
    Bcba,
    #[value(name = "nYSE")]
    Nyse,
    #[value(name = "nASDAQ")]
    Nasdaq,
    #[value(name = "aMEX")]
    Amex,
    #[value(name = "bCS")]
    Bcs,
    #[value(name = "rOFX")]
    Rofx,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bcba => "bCBA",
            Self::Nyse => "nYSE",
            Self::Nasdaq => "nASDAQ",
            Self::Amex => "aMEX",
            Self::Bcs => "bCS",
            Self::Rofx => "rOFX",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Country {
    #[default]
    #[value(name = "argentina")]
    Argentina,
    #[value(name = "estados_Unidos")]
    EstadosUnidos,
}

impl Country {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Argentina => "argentina",
            Self::EstadosUnidos => "estados_Unidos",
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Historic series price adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Adjustment {
    Adjusted,
    #[default]
    Unadjusted,
}

impl Adjustment {
    pub fn from_flag(adjusted: bool) -> Self {
        if adjusted {
            Self::Adjusted
        } else {
            Self::Unadjusted
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adjusted => "ajustada",
            Self::Unadjusted => "sinAjustar",
        }
    }
}

/// `POST /token` response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(rename = ".expires")]
    pub expires: String,
}

/// One order-book level
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Punta {
    #[serde(rename = "cantidadCompra", default, deserialize_with = "lenient_opt_f64")]
    pub bid_q: Option<f64>,
    #[serde(rename = "precioCompra", default, deserialize_with = "lenient_opt_f64")]
    pub bid_price: Option<f64>,
    #[serde(rename = "precioVenta", default, deserialize_with = "lenient_opt_f64")]
    pub ask_price: Option<f64>,
    #[serde(rename = "cantidadVenta", default, deserialize_with = "lenient_opt_f64")]
    pub ask_q: Option<f64>,
}

/// `puntas` arrives as null, a single object or a list of levels
fn puntas<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Punta>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(levels)) => levels
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(serde::de::Error::custom))
            .collect(),
        Some(other) => serde_json::from_value(other)
            .map(|p| vec![p])
            .map_err(serde::de::Error::custom),
    }
}

/// Price fields shared by historic, detail and option quotes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Cotizacion {
    #[serde(rename = "ultimoPrecio", default, deserialize_with = "lenient_opt_f64")]
    pub last_price: Option<f64>,
    #[serde(rename = "variacion", default, deserialize_with = "lenient_opt_f64")]
    pub change: Option<f64>,
    #[serde(rename = "apertura", default, deserialize_with = "lenient_opt_f64")]
    pub open: Option<f64>,
    #[serde(rename = "maximo", default, deserialize_with = "lenient_opt_f64")]
    pub high: Option<f64>,
    #[serde(rename = "minimo", default, deserialize_with = "lenient_opt_f64")]
    pub low: Option<f64>,
    #[serde(rename = "fechaHora", default)]
    pub date_time: Option<String>,
    #[serde(rename = "cierreAnterior", default, deserialize_with = "lenient_opt_f64")]
    pub prev_close: Option<f64>,
    #[serde(rename = "volumenNominal", default, deserialize_with = "lenient_opt_f64")]
    pub volume: Option<f64>,
    #[serde(rename = "cantidadOperaciones", default, deserialize_with = "lenient_opt_f64")]
    pub trades: Option<f64>,
    #[serde(default, deserialize_with = "puntas")]
    pub puntas: Vec<Punta>,
}

/// `.../CotizacionDetalleMobile`
#[derive(Debug, Clone, Deserialize)]
pub struct DetailQuote {
    #[serde(flatten)]
    pub quote: Cotizacion,
    #[serde(rename = "simbolo")]
    pub symbol: String,
    #[serde(rename = "tipo", default)]
    pub kind: Option<String>,
    #[serde(rename = "descripcionTitulo", default)]
    pub description: Option<String>,
    #[serde(rename = "mercado", default)]
    pub market: Option<String>,
    #[serde(rename = "moneda", default)]
    pub currency: Option<Value>,
    #[serde(rename = "pais", default)]
    pub country: Option<String>,
    #[serde(rename = "plazo", default)]
    pub term: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub lote: Option<f64>,
    #[serde(rename = "laminaMinima", default, deserialize_with = "lenient_opt_f64")]
    pub lamina_min: Option<f64>,
    #[serde(rename = "cantidadMinima", default, deserialize_with = "lenient_opt_f64")]
    pub q_min: Option<f64>,
    #[serde(rename = "visible", default)]
    pub shown: Option<bool>,
    #[serde(rename = "operableCompra", default)]
    pub buyable: Option<bool>,
    #[serde(rename = "operableVenta", default)]
    pub sellable: Option<bool>,
}

/// `api/v2/{market}/Titulos/{symbol}`
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfo {
    #[serde(rename = "simbolo")]
    pub symbol: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(rename = "pais", default)]
    pub country: Option<String>,
    #[serde(rename = "mercado", default)]
    pub market: Option<String>,
    #[serde(rename = "tipo", default)]
    pub kind: Option<String>,
    #[serde(rename = "plazo", default)]
    pub term: Option<String>,
    #[serde(rename = "moneda", default)]
    pub currency: Option<String>,
}

/// Entry of `.../Opciones`
#[derive(Debug, Clone, Deserialize)]
pub struct OptionQuote {
    #[serde(rename = "cotizacion", default)]
    pub quote: Cotizacion,
    #[serde(rename = "simboloSubyacente", default)]
    pub underlying: Option<String>,
    /// `2023-02-17T00:00:00`
    #[serde(rename = "fechaVencimiento", default)]
    pub expire: Option<String>,
    #[serde(rename = "tipoOpcion", default)]
    pub kind: Option<String>,
    #[serde(rename = "simbolo")]
    pub symbol: String,
    /// `Call GGAL 170.00 Vencimiento: 17/02/2023`
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(rename = "mercado", default)]
    pub market: Option<String>,
    #[serde(rename = "plazo", default)]
    pub term: Option<String>,
}

/// Entry of a screen quote (`titulos`)
#[derive(Debug, Clone, Deserialize)]
pub struct ScreenQuote {
    #[serde(rename = "simbolo")]
    pub symbol: String,
    #[serde(rename = "descripcion", default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "puntas")]
    pub puntas: Vec<Punta>,
    #[serde(rename = "ultimoPrecio", default, deserialize_with = "lenient_opt_f64")]
    pub last_price: Option<f64>,
    #[serde(rename = "variacionPorcentual", default, deserialize_with = "lenient_opt_f64")]
    pub pct_change: Option<f64>,
    #[serde(rename = "apertura", default, deserialize_with = "lenient_opt_f64")]
    pub open: Option<f64>,
    #[serde(rename = "maximo", default, deserialize_with = "lenient_opt_f64")]
    pub high: Option<f64>,
    #[serde(rename = "minimo", default, deserialize_with = "lenient_opt_f64")]
    pub low: Option<f64>,
    #[serde(rename = "ultimoCierre", default, deserialize_with = "lenient_opt_f64")]
    pub last_close: Option<f64>,
    #[serde(rename = "volumen", default, deserialize_with = "lenient_opt_f64")]
    pub volume: Option<f64>,
    #[serde(rename = "fecha", default)]
    pub date_time: Option<String>,
}

/// Entry of `.../Titulos/Cotizacion/Instrumentos`
#[derive(Debug, Clone, Deserialize)]
pub struct Instrument {
    #[serde(rename = "instrumento")]
    pub instrument: String,
    #[serde(rename = "pais", default)]
    pub country: Option<String>,
}

/// Entry of `.../Titulos/Cotizacion/Paneles/{instrument}`
#[derive(Debug, Clone, Deserialize)]
pub struct Panel {
    pub panel: String,
}

/// Source field -> column for mutual fund listings
pub const FCI_FIELDS: &[(&str, &str)] = &[
    ("descripcion", "desc"),
    ("tipoFondo", "type"),
    ("tipoAdministradoraTituloFCI", "adm_type"),
    ("horizonteInversion", "horizon"),
    ("perfilInversor", "profile"),
    ("variacion", "var"),
    ("variacionMensual", "monthly_var"),
    ("variacionAnual", "yearly_var"),
    ("ultimoOperado", "last_price"),
    ("montoMinimo", "min_amount"),
    ("invierte", "investment"),
    ("plazo", "term"),
    ("rescate", "rescue"),
    ("informeMensual", "report"),
    ("reglamentoGestion", "regulation"),
    ("moneda", "currency"),
    ("pais", "country"),
    ("mercado", "market"),
    ("codigoBloomberg", "bloomberg"),
];

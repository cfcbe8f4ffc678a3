use crate::domain::price::PriceBar;
use crate::error::{DashboardError, Result};
use crate::time::window::unix_to_date;
use serde::Deserialize;

/// Column-oriented OHLC payload: element `i` of every array belongs to bar `i`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ColumnarHistory {
    #[serde(default)]
    pub s: Option<String>,
    #[serde(default)]
    pub errmsg: Option<String>,
    #[serde(default)]
    pub t: Vec<i64>,
    #[serde(default)]
    pub o: Vec<f64>,
    #[serde(default)]
    pub h: Vec<f64>,
    #[serde(default)]
    pub l: Vec<f64>,
    #[serde(default)]
    pub c: Vec<f64>,
    #[serde(default)]
    pub v: Option<Vec<f64>>,
}

impl ColumnarHistory {
    pub fn into_bars(self) -> Result<Vec<PriceBar>> {
        match self.s.as_deref() {
            None | Some("ok") | Some("no_data") => {}
            Some(status) => {
                return Err(DashboardError::RemoteFetch(format!(
                    "provider status {status:?}: {}",
                    self.errmsg.as_deref().unwrap_or("no message")
                )));
            }
        }

        let n = self.t.len();
        let ragged = [self.o.len(), self.h.len(), self.l.len(), self.c.len()]
            .into_iter()
            .any(|len| len != n)
            || self.v.as_ref().is_some_and(|v| v.len() != n);
        if ragged {
            return Err(DashboardError::RemoteFetch(format!(
                "column lengths differ: t={n}, o={}, h={}, l={}, c={}, v={:?}",
                self.o.len(),
                self.h.len(),
                self.l.len(),
                self.c.len(),
                self.v.as_ref().map(Vec::len)
            )));
        }

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let date = unix_to_date(self.t[i]).ok_or_else(|| {
                DashboardError::RemoteFetch(format!("timestamp out of range: {}", self.t[i]))
            })?;
            out.push(PriceBar::from_raw(
                date,
                self.o[i],
                self.h[i],
                self.l[i],
                self.c[i],
                self.v.as_ref().map(|v| v[i]),
            ));
        }
        out.sort_by_key(|b| b.date);
        Ok(out)
    }
}

use super::ui;
use crate::core::cache::CacheStore;
use crate::core::calculators::{self, ReferenceRates};
use anyhow::Result;
use clap::Subcommand;

/// Calculations over the cached reference values.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CalcCommand {
    /// Convert US dollars to pesos at the FIX rate
    UsdToMxn { amount: f64 },
    /// Convert pesos to US dollars at the FIX rate
    MxnToUsd { amount: f64 },
    /// Convert UDIs to pesos
    UdiToMxn { amount: f64 },
    /// Convert pesos to UDIs
    MxnToUdi { amount: f64 },
    /// Real interest rate from the target rate and annual inflation
    RealRate {
        /// Nominal rate in percent, defaults to the cached target rate
        #[arg(long)]
        nominal: Option<f64>,
        /// Inflation in percent, defaults to the cached annual inflation
        #[arg(long)]
        inflation: Option<f64>,
    },
    /// Fiscal update factor between two INPC values
    UpdateFactor {
        /// INPC of the most recent month of the period
        recent: f64,
        /// INPC of the oldest month of the period
        older: f64,
    },
}

/// Evaluates a calculation, returning a labelled result line.
pub fn evaluate(command: &CalcCommand, rates: &ReferenceRates) -> Result<String> {
    let line = match *command {
        CalcCommand::UsdToMxn { amount } => {
            let fix = rates.fix()?;
            let mxn = calculators::usd_to_mxn(amount, fix)?;
            format!("{amount:.2} USD = {mxn:.2} MXN (FIX {fix:.4})")
        }
        CalcCommand::MxnToUsd { amount } => {
            let fix = rates.fix()?;
            let usd = calculators::mxn_to_usd(amount, fix)?;
            format!("{amount:.2} MXN = {usd:.2} USD (FIX {fix:.4})")
        }
        CalcCommand::UdiToMxn { amount } => {
            let udi = rates.udi()?;
            let mxn = calculators::udi_to_mxn(amount, udi)?;
            format!("{amount:.2} UDIS = {mxn:.2} MXN (UDI {udi:.6})")
        }
        CalcCommand::MxnToUdi { amount } => {
            let udi = rates.udi()?;
            let udis = calculators::mxn_to_udi(amount, udi)?;
            format!("{amount:.2} MXN = {udis:.2} UDIS (UDI {udi:.6})")
        }
        CalcCommand::RealRate { nominal, inflation } => {
            let rates = ReferenceRates {
                target_rate: nominal.or(rates.target_rate),
                inflation: inflation.or(rates.inflation),
                ..*rates
            };
            let real = rates.real_rate()?;
            format!("Real rate = {real:.2}%")
        }
        CalcCommand::UpdateFactor { recent, older } => {
            let factor = calculators::fiscal_update_factor(recent, older)?;
            format!("Update factor = {factor:.4}")
        }
    };
    Ok(line)
}

pub async fn run(store: &CacheStore, command: &CalcCommand) -> Result<()> {
    let snapshot = store.load().await?;
    let rates = ReferenceRates::from_snapshot(&snapshot);
    let line = evaluate(command, &rates)?;
    println!("{}", ui::style_text(&line, ui::StyleType::Value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate_uses_cached_rates_and_overrides() {
        let rates = ReferenceRates {
            fix: Some(20.0),
            target_rate: Some(11.0),
            inflation: Some(5.0),
            ..Default::default()
        };

        assert_eq!(
            evaluate(&CalcCommand::UsdToMxn { amount: 10.0 }, &rates).unwrap(),
            "10.00 USD = 200.00 MXN (FIX 20.0000)"
        );
        assert_eq!(
            evaluate(&CalcCommand::RealRate { nominal: None, inflation: None }, &rates).unwrap(),
            "Real rate = 5.71%"
        );
        assert_eq!(
            evaluate(
                &CalcCommand::RealRate {
                    nominal: Some(5.0),
                    inflation: None
                },
                &rates
            )
            .unwrap(),
            "Real rate = 0.00%"
        );
        assert_eq!(
            evaluate(&CalcCommand::UpdateFactor { recent: 136.0, older: 128.0 }, &rates).unwrap(),
            "Update factor = 1.0625"
        );

        let err = evaluate(&CalcCommand::UdiToMxn { amount: 1.0 }, &rates).unwrap_err();
        assert!(err.to_string().contains("UDI"));
    }
}

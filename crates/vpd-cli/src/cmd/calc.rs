use vpd_core::types::estimate_leaf_temp;
use vpd_core::vpd::{self, VpdZone};

use crate::output::print_json;

pub fn run(
    air: f64,
    humidity: f64,
    leaf: Option<f64>,
    target: Option<f64>,
    json: bool,
) -> anyhow::Result<()> {
    let leaf = leaf.unwrap_or_else(|| estimate_leaf_temp(air));
    let pair = vpd::vpd(Some(air), Some(leaf), Some(humidity));
    if !pair.is_usable() {
        anyhow::bail!("reading is out of range: air {air} °C, leaf {leaf} °C, humidity {humidity} %");
    }
    let zone = VpdZone::classify(pair.leaf_vpd);
    let required = target.map(|t| vpd::required_humidity(t, air, leaf));

    if json {
        print_json(&serde_json::json!({
            "air_temp": air,
            "leaf_temp": leaf,
            "humidity": humidity,
            "air_vpd": pair.air_vpd,
            "leaf_vpd": pair.leaf_vpd,
            "zone": zone,
            "target_vpd": target,
            "required_humidity": required,
        }))?;
        return Ok(());
    }

    println!("air VPD:   {:.2} kPa", pair.air_vpd);
    println!("leaf VPD:  {:.2} kPa ({})", pair.leaf_vpd, zone.as_str());
    if let (Some(t), Some(h)) = (target, required) {
        println!("for {t:.2} kPa: {h:.1} % RH");
    }
    Ok(())
}

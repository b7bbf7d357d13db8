use serde_json::json;

/// Print a sample feed file to stdout. Pipe it to disk and point
/// `prop-flow pipeline --feed` at it for an end-to-end local run.
pub fn run() -> anyhow::Result<()> {
    let feed = json!([
        {
            "id": "treb-C5551001",
            "mls_number": "C5551001",
            "status": "Active",
            "listed_at": "2026-07-02T14:30:00Z",
            "updated_at": "2026-07-28T09:15:00Z",
            "address": {
                "street": "88 Scott St, Unit 1204",
                "city": "Toronto",
                "province": "ON",
                "postal_code": "M5E 0A9",
                "country": "CA",
                "lat": 43.6486,
                "lng": -79.3762
            },
            "property_type": "Condo Apt",
            "beds": 2,
            "baths": 2,
            "sqft": 845,
            "list_price": 749000.0,
            "taxes_annual": 3420.0,
            "condo_fee_monthly": 612.0,
            "photos": ["https://cdn.example.com/treb/C5551001/1.jpg"],
            "brokerage": "Harbourfront Realty Inc."
        },
        {
            "id": "treb-W5551002",
            "mls_number": "W5551002",
            "status": "Active",
            "listed_at": "2026-07-10T11:00:00Z",
            "updated_at": "2026-07-27T16:40:00Z",
            "address": {
                "street": "41 Maple Grove Ave",
                "city": "Mississauga",
                "province": "ON",
                "postal_code": "L5G 2V7",
                "country": "CA"
            },
            "property_type": "Townhouse",
            "beds": 3,
            "baths": 3,
            "sqft": 1580,
            "list_price": 929000.0,
            "condo_fee_monthly": 310.0
        },
        {
            "id": "crea-V5551003",
            "mls_number": "V5551003",
            "status": "Active",
            "listed_at": "2026-06-20T08:00:00Z",
            "updated_at": "2026-07-29T19:05:00Z",
            "address": {
                "street": "1833 Frances St",
                "city": "Vancouver",
                "province": "BC",
                "postal_code": "V5L 1Z6",
                "country": "CA",
                "lat": 49.2788,
                "lng": -123.0706
            },
            "property_type": "House",
            "beds": 4,
            "baths": 2,
            "sqft": 2210,
            "list_price": 1649000.0,
            "taxes_annual": 5890.0
        }
    ]);

    println!("{}", serde_json::to_string_pretty(&feed)?);
    Ok(())
}

//! Rules turning categorical survey answers into quantities.

use crate::prediction::domain::{DerivedFields, Submission};

pub(crate) fn derive_fields(submission: &Submission) -> DerivedFields {
    DerivedFields {
        lpg_kg: lpg_kg(submission),
        flights_hours: flights_hours(&submission.air_travel),
        meat_meals: meat_meals(&submission.diet, submission.grocery_bill),
        dining_out: dining_out(&submission.social_activity, submission.grocery_bill),
        shopping_spend: shopping_spend(submission),
        waste_kg: waste_kg(submission),
    }
}

fn normalized(value: &str) -> String {
    value.trim().to_ascii_lowercase()
}

fn uses_method(methods: &[String], method: &str) -> bool {
    methods
        .iter()
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(method))
}

pub(crate) fn lpg_kg(submission: &Submission) -> f64 {
    let mut lpg = 10.0;
    if uses_method(&submission.cooking_methods, "stove") {
        lpg += 5.0;
    }
    if uses_method(&submission.cooking_methods, "oven") {
        lpg += 3.0;
    }
    if uses_method(&submission.cooking_methods, "grill") {
        lpg += 2.0;
    }

    let diet_scale = match normalized(&submission.diet).as_str() {
        "vegetarian" => 0.8,
        "vegan" => 0.6,
        "omnivore" => 1.2,
        _ => 1.0,
    };
    lpg * diet_scale
}

pub(crate) fn flights_hours(air_travel: &str) -> f64 {
    match normalized(air_travel).as_str() {
        "rarely" => 2.0,
        "frequently" => 8.0,
        "very frequently" => 16.0,
        _ => 0.0,
    }
}

/// Diets other than the four recognised ones count as omnivore.
pub(crate) fn meat_meals(diet: &str, grocery_bill: f64) -> u32 {
    let share = match normalized(diet).as_str() {
        "vegan" | "vegetarian" => return 0,
        "pescatarian" => 0.1,
        _ => 0.2,
    };
    (grocery_bill * share).trunc() as u32
}

pub(crate) fn dining_out(social_activity: &str, grocery_bill: f64) -> u32 {
    let mut dining: i64 = 5;
    match normalized(social_activity).as_str() {
        "very often" => dining += 10,
        "often" => dining += 5,
        "rarely" => dining -= 2,
        _ => {}
    }

    if grocery_bill < 100.0 {
        dining += 5;
    } else if grocery_bill > 300.0 {
        dining -= 3;
    }

    dining.max(0) as u32
}

pub(crate) fn shopping_spend(submission: &Submission) -> f64 {
    let mut spend = f64::from(submission.new_clothes) * 50.0;
    if submission.tv_pc_hours > 8.0 {
        spend += 100.0;
    }
    if submission.internet_hours > 10.0 {
        spend += 50.0;
    }
    spend
}

pub(crate) fn waste_kg(submission: &Submission) -> f64 {
    let mut waste = f64::from(submission.waste_bag_count) * 2.5;
    if submission.grocery_bill > 200.0 {
        waste *= 1.2;
    }
    if submission.recycling.len() > 2 {
        waste *= 0.8;
    }
    waste
}

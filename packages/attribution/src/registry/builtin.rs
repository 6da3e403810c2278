//! Built-in task and category schemas.

use crate::types::schema::{AttributeSchema, FieldSpec};

const ALLERGENS: [&str; 7] = ["Peanuts", "Tree_Nuts", "Soy", "Milk", "Eggs", "Wheat", "Shellfish"];

const DIETARY: [&str; 15] = [
    "Gluten_Free",
    "Lactose_Free",
    "Artificial_Sweetener_Added",
    "Caffeine_Free",
    "Sugar_Free",
    "No_Sugar_Added",
    "Organic",
    "Vegan",
    "Vegetarian",
    "Dairy_Alternative",
    "Kosher",
    "Halal",
    "Non_GMO",
    "Keto",
    "Cruelty_Free",
];

const NUTRIENTS: [&str; 12] = [
    "Servings_Per_Container",
    "Calories",
    "Total_Fat",
    "Saturated_Fat",
    "Trans_Fat",
    "Cholesterol",
    "Sodium",
    "Total_Carbohydrate",
    "Dietary_Fiber",
    "Total_Sugars",
    "Added_Sugars",
    "Protein",
];

fn product_name() -> FieldSpec {
    FieldSpec::text("Product_Name_Scraped")
        .describe("Product name exactly as written in the document")
        .identity()
}

fn serving_size() -> FieldSpec {
    FieldSpec::text("Serving_Size")
        .describe("Serving size as printed, including units")
        .identity()
}

pub fn nutrition() -> AttributeSchema {
    let schema = AttributeSchema::new("nutrition", "Nutrition")
        .with_description("Nutrition facts panel values per serving")
        .field(product_name())
        .field(serving_size());

    NUTRIENTS.iter().fold(schema, |schema, name| {
        schema.field(
            FieldSpec::text(*name).describe("Amount per serving as printed, including units"),
        )
    })
}

pub fn ingredients() -> AttributeSchema {
    AttributeSchema::new("ingredients", "Ingredients")
        .with_description("Ingredient statement")
        .field(product_name())
        .field(serving_size())
        .field(
            FieldSpec::text_list("Ingredients")
                .describe("Ingredients in label order, one item per ingredient"),
        )
}

pub fn allergens() -> AttributeSchema {
    let mut schema = AttributeSchema::new("allergens", "Allergens")
        .with_description("Allergen declarations and dietary claims")
        .field(product_name())
        .field(serving_size());

    for name in ALLERGENS {
        schema = schema.field(
            FieldSpec::enumeration(name, ["Yes", "No", "May Contain"])
                .describe("Whether the product contains this allergen"),
        );
        // facility statements are only captured for nuts
        if name == "Peanuts" || name == "Tree_Nuts" {
            let label = name.replace('_', " ").to_lowercase();
            schema = schema.field(
                FieldSpec::enumeration(format!("Mfg_In_Facility_{name}"), ["Yes", "No"]).describe(
                    format!("Manufactured in a facility that also processes {label}"),
                ),
            );
        }
    }

    for name in DIETARY {
        schema = schema.field(
            FieldSpec::enumeration(name, ["Yes", "No"]).describe("Whether the label makes this claim"),
        );
    }

    schema
}

pub fn beef() -> AttributeSchema {
    AttributeSchema::new("beef", "Beef")
        .with_description("Beef product specification")
        .field(
            FieldSpec::text("product_name_scraped")
                .describe("Name of the beef product")
                .identity(),
        )
        .field(FieldSpec::text("manufacturer").describe("Name of the manufacturer or brand"))
        .field(FieldSpec::text("size").describe("Size in units of measure (e.g. 17 lbs)"))
        .field(FieldSpec::text("fat_level").describe("Fat content (e.g. lean, medium, high)"))
        .field(
            FieldSpec::enumeration(
                "breed",
                ["Wagyu", "Kobe", "Kauai", "Akaushi", "Hereford", "Angus"],
            )
            .describe("Breed of the cattle"),
        )
        .field(FieldSpec::enumeration("temperature", ["Fresh", "Frozen"]).describe("Storage temperature"))
        .field(
            FieldSpec::enumeration("quality", ["No Roll", "Choice", "Prime", "Select"])
                .describe("Quality grade"),
        )
        .field(
            FieldSpec::enumeration(
                "type_blend",
                ["Brisket/Chuck Blend", "Beef and Turkey", "Beef and Chicken", "Steakburger"],
            )
            .describe("Type or blend of beef"),
        )
        .field(
            FieldSpec::enumeration(
                "flavor",
                [
                    "Mushroom",
                    "Teriyaki",
                    "Jalapeno",
                    "With Au Jus",
                    "Mesquite",
                    "With Onion",
                    "With Peppers",
                    "BBQ",
                    "With Beans",
                    "Cheese",
                    "Seasoned",
                ],
            )
            .describe("Flavor profile or seasoning"),
        )
        .field(FieldSpec::boolean("includes_soy").describe("Contains soy ingredients"))
        .field(FieldSpec::boolean("is_antibiotic_free"))
        .field(FieldSpec::boolean("is_grass_fed"))
        .field(FieldSpec::boolean("is_kosher"))
        .field(FieldSpec::boolean("is_halal"))
        .field(FieldSpec::boolean("is_child_nutrition").describe("Meets child nutrition requirements"))
        .field(FieldSpec::boolean("is_low_sodium"))
        .field(
            FieldSpec::enumeration("shape", ["Oval/Hoagie", "Round", "Square", "Cloud"])
                .describe("Physical shape"),
        )
        .field(
            FieldSpec::enumeration(
                "thickness",
                [
                    "3/8 inch Thick",
                    "1/2 inch Thick",
                    "1 inch Thick",
                    "5/8 inch Thick",
                    "3/4 inch Thick",
                    "1/8 inch Thick",
                ],
            )
            .describe("Thickness of the cut"),
        )
        .field(FieldSpec::boolean("is_gluten_free"))
        .field(FieldSpec::text("opl").describe("Other product labeling or special classification"))
}

pub fn shrimp() -> AttributeSchema {
    AttributeSchema::new("shrimp", "Shrimp")
        .with_description("Shrimp product specification")
        .field(
            FieldSpec::text("product_name_scraped")
                .describe("Name of the shrimp product")
                .identity(),
        )
        .field(FieldSpec::text("manufacturer").describe("Name of the manufacturer or brand"))
        .field(FieldSpec::text("size").describe("Size in units of measure (e.g. 17 lbs)"))
        .field(
            FieldSpec::enumeration(
                "type",
                ["Black Tiger", "Blue", "Brown", "Pink", "Prawn", "Red", "Rock", "White"],
            )
            .describe("Type of shrimp"),
        )
        .field(FieldSpec::boolean("head_on"))
        .field(FieldSpec::enumeration("shell_on", ["EZ Peel", "Peeled", "Shell On"]).describe("Shell status"))
        .field(FieldSpec::boolean("deveined"))
        .field(FieldSpec::boolean("tail_on"))
        .field(
            FieldSpec::enumeration(
                "size_range",
                [
                    "10 ct - 15.9 ct",
                    "100 ct - 199.9 ct",
                    "16 ct - 20.9 ct",
                    "200 ct and Greater",
                    "21 ct - 25.9 ct",
                    "26 ct - 30.9 ct",
                    "31 ct - 40.9 ct",
                    "41 ct - 60.9 ct",
                    "61 ct - 99.9 ct",
                    "9.9 ct or Fewer",
                    "Pieces",
                ],
            )
            .describe("Count per pound"),
        )
        .field(FieldSpec::enumeration("origin", ["Domestic", "Imported"]))
        .field(FieldSpec::enumeration("processing_doneness", ["Cooked", "Smoked"]))
        .field(FieldSpec::enumeration("butterflied", ["Butterflied", "EBI", "Skewered"]))
        .field(FieldSpec::enumeration("wild_farmed", ["Farmed", "Wild"]))
        .field(
            FieldSpec::enumeration(
                "portion_size",
                [
                    "1 lb and Under",
                    "1.1 lbs - 2.9 lbs",
                    "10.1 lbs - 25 lbs",
                    "25.1 lbs and Above",
                    "3 lbs - 5 lbs",
                    "5.1 lbs - 10 lbs",
                ],
            )
            .describe("Portion size range"),
        )
        .field(FieldSpec::boolean("is_chemical_free"))
        .field(
            FieldSpec::enumeration(
                "opl",
                [
                    "OPL - Biaggi's",
                    "OPL - Copelands",
                    "OPL - Festival",
                    "OPL - Granite City",
                    "OPL - Hooter's",
                    "OPL - Landry's",
                    "OPL - Long John Silvers",
                    "OPL - MGM Grand",
                    "OPL - Oishii",
                    "OPL - Panda Express",
                    "OPL - Red Robin Restaurants",
                    "OPL - Ruth Chris",
                    "OPL - Sea Island",
                    "OPL - Village Tavern",
                    "OPL - Wing House",
                    "Usda Commodities",
                ],
            )
            .describe("Other product labeling"),
        )
}

pub fn all() -> Vec<AttributeSchema> {
    vec![nutrition(), ingredients(), allergens(), beef(), shrimp()]
}

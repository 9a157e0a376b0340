//! Assembly of the built-in function catalog

use super::FunctionRegistry;
use crate::core::Result;

impl FunctionRegistry {
    pub fn register_default_functions(&self) -> Result<()> {
        self.register_math_functions()?;
        self.register_conversion_functions()?;
        self.register_conditional_functions()?;
        self.register_aggregate_functions()?;
        self.register_string_functions()?;
        self.register_fuzzy_functions()?;
        self.register_datetime_functions()?;
        self.register_color_functions()?;
        self.register_geometry_functions()?;
        self.register_record_functions()?;
        self.register_general_functions()?;
        self.register_array_functions()?;
        self.register_map_functions()?;
        Ok(())
    }
}
